//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the screening
//! pipeline. The defaults reproduce the preprocessing the model was trained
//! with: Fp1/Fp2, a 0.5–50 Hz band-pass, 2500-sample windows, per-window
//! min-max scaling and a majority vote over windows.
//!
//! ```
//! use eegscreen::{Aggregation, PipelineConfig, WindowLength};
//!
//! let cfg = PipelineConfig {
//!     window: WindowLength::Seconds(10.0),
//!     aggregation: Aggregation::MeanProbability,
//!     ..PipelineConfig::default()
//! };
//! assert!(cfg.validate().is_ok());
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::error::{Result, ScreenError};
use crate::select::LabelMatch;

/// Window length, either as a fixed sample count or as a duration that is
/// converted with the recording's sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowLength {
    Samples(usize),
    Seconds(f64),
}

impl WindowLength {
    /// Window length in samples for a recording at `sample_rate` Hz.
    pub fn resolve(&self, sample_rate: f64) -> Result<usize> {
        match *self {
            WindowLength::Samples(n) if n > 0 => Ok(n),
            WindowLength::Seconds(s) if s > 0.0 && s.is_finite() => {
                let n = (s * sample_rate).round();
                if n < 1.0 {
                    return Err(ScreenError::InvalidConfig(format!(
                        "{} s at {} Hz is shorter than one sample",
                        s, sample_rate
                    )));
                }
                Ok(n as usize)
            }
            other => Err(ScreenError::InvalidConfig(format!(
                "window length must be positive, got {:?}",
                other
            ))),
        }
    }
}

/// Zero-phase Butterworth band-pass applied to each selected channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPass {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl Default for BandPass {
    fn default() -> Self {
        BandPass {
            low_hz: 0.5,
            high_hz: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Channels fed to the model, in model input order.
    ///
    /// Default: `["Fp1", "Fp2"]`.
    pub channels: Vec<String>,

    /// How configured labels are matched against file labels.
    ///
    /// Default: [`LabelMatch::Exact`].
    pub label_match: LabelMatch,

    /// Default: 2500 samples (10 s at 250 Hz).
    pub window: WindowLength,

    /// Distance in samples between window starts. `None` means the window
    /// length, i.e. no overlap.
    pub stride: Option<usize>,

    /// Default: 0.5–50 Hz. `None` disables filtering.
    pub bandpass: Option<BandPass>,

    /// Added to each row's range during min-max scaling.
    ///
    /// Default: `1e-8`.
    pub epsilon: f64,

    /// Scores strictly above this are abnormal.
    ///
    /// Default: `0.5`.
    pub threshold: f64,

    /// Default: [`Aggregation::MajorityVote`].
    pub aggregation: Aggregation,

    /// Windows per classifier call.
    ///
    /// Default: `32`.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            channels: vec!["Fp1".to_string(), "Fp2".to_string()],
            label_match: LabelMatch::Exact,
            window: WindowLength::Samples(2500),
            stride: None,
            bandpass: Some(BandPass::default()),
            epsilon: crate::normalize::DEFAULT_EPSILON,
            threshold: 0.5,
            aggregation: Aggregation::MajorityVote,
            batch_size: 32,
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON config; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScreenError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(text)
            .map_err(|e| ScreenError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every parameter that can be checked without a recording.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ScreenError::InvalidConfig(msg));

        if self.channels.is_empty() {
            return invalid("at least one channel is required".to_string());
        }
        let mut seen = HashSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.as_str()) {
                return invalid(format!("channel '{}' listed twice", ch));
            }
        }

        match self.window {
            WindowLength::Samples(0) => return invalid("window must be at least one sample".to_string()),
            WindowLength::Seconds(s) if !(s > 0.0 && s.is_finite()) => {
                return invalid(format!("window of {} s is not positive", s))
            }
            _ => {}
        }
        if self.stride == Some(0) {
            return invalid("stride must be at least one sample".to_string());
        }

        if let Some(bp) = self.bandpass {
            if !(bp.low_hz > 0.0 && bp.high_hz > bp.low_hz && bp.high_hz.is_finite()) {
                return invalid(format!(
                    "band-pass needs 0 < low < high, got {}–{} Hz",
                    bp.low_hz, bp.high_hz
                ));
            }
        }

        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return invalid(format!("epsilon must be positive, got {}", self.epsilon));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return invalid(format!("threshold must lie in (0, 1), got {}", self.threshold));
        }
        if self.batch_size == 0 {
            return invalid("batch size must be at least 1".to_string());
        }

        Ok(())
    }
}
