//! Reduction of per-window scores to one file-level verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How window scores are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Threshold every window, then take the majority label.
    #[default]
    MajorityVote,
    /// Average all scores, then threshold the mean once.
    MeanProbability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Healthy,
    Abnormal,
    /// As many abnormal as healthy windows (or a mean exactly at the threshold).
    Inconclusive,
    /// Not a single window could be scored.
    NoData,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Healthy => "HEALTHY",
            Verdict::Abnormal => "ABNORMAL",
            Verdict::Inconclusive => "INCONCLUSIVE",
            Verdict::NoData => "NO_DATA",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileVerdict {
    pub verdict: Verdict,
    pub healthy_segments: usize,
    pub abnormal_segments: usize,
    /// `None` when there were no scores.
    pub mean_score: Option<f64>,
    pub aggregation: Aggregation,
}

/// A window is abnormal when its score is strictly above `threshold`.
pub fn is_abnormal(score: f64, threshold: f64) -> bool {
    score > threshold
}

/// Combines window scores into a [`FileVerdict`].
///
/// Counts are always the per-window threshold counts, whichever mode
/// decides the verdict. An empty score list is [`Verdict::NoData`].
///
/// ```
/// use eegscreen::{aggregate, Aggregation, Verdict};
///
/// let scores = [0.9, 0.8, 0.7, 0.2];
/// let v = aggregate(&scores, 0.5, Aggregation::MajorityVote);
/// assert_eq!(v.verdict, Verdict::Abnormal);
/// assert_eq!((v.healthy_segments, v.abnormal_segments), (1, 3));
/// ```
pub fn aggregate(scores: &[f64], threshold: f64, mode: Aggregation) -> FileVerdict {
    let abnormal_segments = scores.iter().filter(|&&s| is_abnormal(s, threshold)).count();
    let healthy_segments = scores.len() - abnormal_segments;
    let mean_score = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    let verdict = match (mode, mean_score) {
        (_, None) => Verdict::NoData,
        (Aggregation::MajorityVote, Some(_)) => {
            if abnormal_segments > healthy_segments {
                Verdict::Abnormal
            } else if healthy_segments > abnormal_segments {
                Verdict::Healthy
            } else {
                Verdict::Inconclusive
            }
        }
        (Aggregation::MeanProbability, Some(mean)) => {
            if mean > threshold {
                Verdict::Abnormal
            } else if mean < threshold {
                Verdict::Healthy
            } else {
                Verdict::Inconclusive
            }
        }
    };

    FileVerdict {
        verdict,
        healthy_segments,
        abnormal_segments,
        mean_score,
        aggregation: mode,
    }
}
