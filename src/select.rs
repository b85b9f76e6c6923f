//! Channel selection by label.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScreenError};
use crate::types::RawRecording;

/// Label comparison rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMatch {
    /// Labels must be byte-for-byte equal.
    #[default]
    Exact,
    /// Case, whitespace, a leading `EEG` tag and a trailing reference
    /// suffix (`-REF`, `-LE`, `-A1`, `-A2`, `-M1`, `-M2`) are ignored, so
    /// `"EEG Fp1-REF"` matches `"fp1"`.
    Normalized,
}

const REFERENCE_SUFFIXES: [&str; 6] = ["-ref", "-le", "-a1", "-a2", "-m1", "-m2"];

fn normalize_label(label: &str) -> String {
    let mut s: String = label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if s.len() > 3 && s.starts_with("eeg") {
        s.drain(..3);
    }
    for suffix in REFERENCE_SUFFIXES {
        if s.len() > suffix.len() && s.ends_with(suffix) {
            s.truncate(s.len() - suffix.len());
            break;
        }
    }
    s
}

/// Ordered subset of a recording's channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSignal {
    labels: Vec<String>,
    sample_rate: f64,
    channels: Vec<Vec<f64>>,
}

impl SelectedSignal {
    /// Labels as they appear in the source file, in requested order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    /// Applies `f` to every channel in place.
    pub fn map_channels<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        for ch in &mut self.channels {
            *ch = f(ch);
        }
        self
    }

    /// Back to a standalone recording, e.g. for export.
    pub fn into_recording(self) -> Result<RawRecording> {
        RawRecording::new(self.labels, self.sample_rate, self.channels)
    }
}

/// Picks a fixed, ordered list of channels from a recording.
#[derive(Debug, Clone)]
pub struct ChannelSelector {
    labels: Vec<String>,
    matching: LabelMatch,
}

impl ChannelSelector {
    pub fn new<S: AsRef<str>>(labels: &[S], matching: LabelMatch) -> Self {
        ChannelSelector {
            labels: labels.iter().map(|s| s.as_ref().to_string()).collect(),
            matching,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Copies the requested channels out of `recording`, in requested order.
    ///
    /// A label absent from the recording is an error; nothing is substituted.
    pub fn select(&self, recording: &RawRecording) -> Result<SelectedSignal> {
        let mut labels = Vec::with_capacity(self.labels.len());
        let mut channels = Vec::with_capacity(self.labels.len());

        for wanted in &self.labels {
            let index = self.find(recording.labels(), wanted)?;
            labels.push(recording.labels()[index].clone());
            channels.push(recording.channels()[index].clone());
        }

        Ok(SelectedSignal {
            labels,
            sample_rate: recording.sample_rate(),
            channels,
        })
    }

    fn find(&self, available: &[String], wanted: &str) -> Result<usize> {
        match self.matching {
            LabelMatch::Exact => available
                .iter()
                .position(|l| l == wanted)
                .ok_or_else(|| ScreenError::ChannelNotFound(wanted.to_string())),
            LabelMatch::Normalized => {
                // an exact hit wins even if other labels normalize the same way
                if let Some(i) = available.iter().position(|l| l == wanted) {
                    return Ok(i);
                }
                let key = normalize_label(wanted);
                let hits: Vec<usize> = available
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| normalize_label(l) == key)
                    .map(|(i, _)| i)
                    .collect();
                match hits.as_slice() {
                    [] => Err(ScreenError::ChannelNotFound(wanted.to_string())),
                    [i] => Ok(*i),
                    _ => Err(ScreenError::AmbiguousChannel {
                        label: wanted.to_string(),
                        candidates: hits.iter().map(|&i| available[i].clone()).collect(),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(labels: &[&str]) -> RawRecording {
        let channels = (0..labels.len()).map(|i| vec![i as f64; 8]).collect();
        RawRecording::new(labels.iter().map(|s| s.to_string()).collect(), 250.0, channels).unwrap()
    }

    #[test]
    fn selects_in_requested_order() {
        let rec = recording(&["Fz", "Fp1", "Cz", "Fp2"]);
        let sel = ChannelSelector::new(&["Fp2", "Fp1"], LabelMatch::Exact)
            .select(&rec)
            .unwrap();
        assert_eq!(sel.labels(), &["Fp2", "Fp1"]);
        assert_eq!(sel.channels()[0][0], 3.0);
        assert_eq!(sel.channels()[1][0], 1.0);
        assert_eq!(sel.sample_count(), 8);
        assert_eq!(sel.sample_rate(), 250.0);
    }

    #[test]
    fn every_subset_comes_back_in_order() {
        let all = ["A", "B", "C", "D"];
        let rec = recording(&all);
        for mask in 1u32..16 {
            let subset: Vec<&str> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, l)| *l)
                .rev()
                .collect();
            let sel = ChannelSelector::new(&subset, LabelMatch::Exact).select(&rec).unwrap();
            assert_eq!(sel.labels(), subset.as_slice());
        }
    }

    #[test]
    fn missing_label_is_named() {
        let rec = recording(&["Fp1", "Cz"]);
        let err = ChannelSelector::new(&["Fp1", "Fp2"], LabelMatch::Exact)
            .select(&rec)
            .unwrap_err();
        match err {
            ScreenError::ChannelNotFound(label) => assert_eq!(label, "Fp2"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn exact_matching_is_strict() {
        let rec = recording(&["EEG Fp1-REF", "EEG Fp2-REF"]);
        assert!(ChannelSelector::new(&["Fp1"], LabelMatch::Exact).select(&rec).is_err());
    }

    #[test]
    fn normalized_matching() {
        let rec = recording(&["EEG Fp1-REF", "EEG FP2-REF", "EEG Cz-LE"]);
        let sel = ChannelSelector::new(&["Fp1", "fp2", "CZ"], LabelMatch::Normalized)
            .select(&rec)
            .unwrap();
        assert_eq!(sel.labels(), &["EEG Fp1-REF", "EEG FP2-REF", "EEG Cz-LE"]);
    }

    #[test]
    fn normalized_matching_reports_ambiguity() {
        let rec = recording(&["EEG Fp1-REF", "EEG Fp1-LE"]);
        let err = ChannelSelector::new(&["Fp1"], LabelMatch::Normalized)
            .select(&rec)
            .unwrap_err();
        assert!(matches!(err, ScreenError::AmbiguousChannel { ref candidates, .. } if candidates.len() == 2));

        // exact label still resolves
        let sel = ChannelSelector::new(&["EEG Fp1-LE"], LabelMatch::Normalized)
            .select(&rec)
            .unwrap();
        assert_eq!(sel.labels(), &["EEG Fp1-LE"]);
    }

    #[test]
    fn label_normalization() {
        assert_eq!(normalize_label("EEG Fp1-REF"), "fp1");
        assert_eq!(normalize_label(" Fp 2 "), "fp2");
        assert_eq!(normalize_label("EEG"), "eeg");
        assert_eq!(normalize_label("C3-A2"), "c3");
    }
}
