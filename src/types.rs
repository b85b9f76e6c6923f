use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::error::{Result, ScreenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Edf,
    EdfPlusContinuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalParam {
    pub label: String,
    pub physical_max: f64,
    pub physical_min: f64,
    pub digital_max: i32,
    pub digital_min: i32,
    pub samples_per_record: i32,
    pub physical_dimension: String,
    pub prefilter: String,
    pub transducer: String,
}

impl SignalParam {
    /// EEG channel in microvolts with the full 16-bit digital range.
    pub fn eeg(label: &str, samples_per_record: i32, physical_range: f64) -> Self {
        SignalParam {
            label: label.to_string(),
            physical_max: physical_range,
            physical_min: -physical_range,
            digital_max: 32767,
            digital_min: -32768,
            samples_per_record,
            physical_dimension: "uV".to_string(),
            prefilter: String::new(),
            transducer: String::new(),
        }
    }

    /// Physical units per digital step.
    pub fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    pub fn to_physical(&self, digital_value: i32) -> f64 {
        self.bit_value() * (self.offset() + digital_value as f64)
    }

    pub fn to_digital(&self, physical_value: f64) -> i32 {
        let digital = (physical_value / self.bit_value()) - self.offset();
        (digital.round() as i32).max(self.digital_min).min(self.digital_max)
    }
}

/// Decoded EDF header. Annotation signals are not listed in `signals`.
#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub file_type: FileType,
    pub signals: Vec<SignalParam>,
    /// `None` when the file carries an unparseable date or time field.
    pub start: Option<NaiveDateTime>,
    pub datarecords_in_file: i64,
    /// Data record duration in units of [`crate::EDF_TIME_DIMENSION`].
    pub datarecord_duration: i64,
    pub patient: String,
    pub recording: String,
}

impl EdfHeader {
    pub fn datarecord_seconds(&self) -> f64 {
        self.datarecord_duration as f64 / crate::EDF_TIME_DIMENSION as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.datarecord_seconds() * self.datarecords_in_file as f64
    }

    /// Sampling frequency of signal `index` in Hz.
    pub fn sample_rate(&self, index: usize) -> Option<f64> {
        let seconds = self.datarecord_seconds();
        if seconds <= 0.0 {
            return None;
        }
        self.signals
            .get(index)
            .map(|s| s.samples_per_record as f64 / seconds)
    }
}

/// Whole-file multichannel recording in physical units.
///
/// All channels share one sample rate and one sample count, and labels are
/// unique. These invariants are checked by [`RawRecording::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecording {
    labels: Vec<String>,
    sample_rate: f64,
    channels: Vec<Vec<f64>>,
}

impl RawRecording {
    pub fn new(labels: Vec<String>, sample_rate: f64, channels: Vec<Vec<f64>>) -> Result<Self> {
        if channels.is_empty() {
            return Err(ScreenError::InvalidRecording("recording has no channels".to_string()));
        }
        if labels.len() != channels.len() {
            return Err(ScreenError::InvalidRecording(format!(
                "{} labels for {} channels",
                labels.len(),
                channels.len()
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ScreenError::InvalidRecording(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }

        let mut seen = HashSet::new();
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(ScreenError::InvalidRecording(format!(
                    "duplicate channel label '{}'",
                    label
                )));
            }
        }

        let expected = channels[0].len();
        if let Some((i, ch)) = channels.iter().enumerate().find(|(_, ch)| ch.len() != expected) {
            return Err(ScreenError::InvalidRecording(format!(
                "channel '{}' has {} samples, expected {}",
                labels[i],
                ch.len(),
                expected
            )));
        }

        Ok(RawRecording {
            labels,
            sample_rate,
            channels,
        })
    }

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
        self.channels[0].len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn duration_seconds(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_digital_conversion() {
        let signal = SignalParam::eeg("Fp1", 256, 100.0);
        let physical = signal.to_physical(16384);
        assert!((physical - 50.0).abs() < 0.1);
        assert!((signal.to_digital(25.0) - 8192).abs() <= 1);
        assert_eq!(signal.to_digital(1e6), 32767);
        assert_eq!(signal.to_digital(-1e6), -32768);
    }

    #[test]
    fn recording_rejects_ragged_channels() {
        let err = RawRecording::new(
            vec!["Fp1".to_string(), "Fp2".to_string()],
            250.0,
            vec![vec![0.0; 10], vec![0.0; 9]],
        )
        .unwrap_err();
        assert!(matches!(err, ScreenError::InvalidRecording(_)));
    }

    #[test]
    fn recording_rejects_duplicate_labels() {
        let err = RawRecording::new(
            vec!["Fp1".to_string(), "Fp1".to_string()],
            250.0,
            vec![vec![0.0; 10], vec![0.0; 10]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn recording_rejects_empty_and_bad_rate() {
        assert!(RawRecording::new(vec![], 250.0, vec![]).is_err());
        assert!(RawRecording::new(vec!["A".to_string()], 0.0, vec![vec![1.0]]).is_err());
        assert!(RawRecording::new(vec!["A".to_string()], f64::NAN, vec![vec![1.0]]).is_err());
    }

    #[test]
    fn recording_accessors() {
        let rec = RawRecording::new(
            vec!["Fp1".to_string(), "Fp2".to_string()],
            250.0,
            vec![vec![1.0; 500], vec![2.0; 500]],
        )
        .unwrap();
        assert_eq!(rec.channel_count(), 2);
        assert_eq!(rec.sample_count(), 500);
        assert_eq!(rec.channel(1).unwrap()[0], 2.0);
        assert!(rec.channel(2).is_none());
        assert!((rec.duration_seconds() - 2.0).abs() < 1e-12);
    }
}
