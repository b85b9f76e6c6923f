//! End-to-end screening of one recording.
//!
//! raw signal -> channel selection -> band-pass -> windows -> min-max
//! scaling -> batched inference -> aggregation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::aggregate::{aggregate, Aggregation, FileVerdict, Verdict};
use crate::classifier::{check_scores, Classifier, WindowBatch};
use crate::config::PipelineConfig;
use crate::error::{Result, ScreenError};
use crate::filter::BandPassFilter;
use crate::normalize::{normalize, NormalizedSegment};
use crate::segment::Segmenter;
use crate::select::{ChannelSelector, SelectedSignal};
use crate::source::{EdfBytesSource, EdfFileSource, SignalSource};
use crate::types::RawRecording;

/// Outcome for one file: the verdict plus everything needed to display or
/// log how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    #[serde(flatten)]
    pub verdict: FileVerdict,
    /// One score per window, in window order.
    pub scores: Vec<f64>,
    pub segment_count: usize,
    pub window_samples: usize,
    pub stride_samples: usize,
    pub sample_rate: f64,
    pub channels: Vec<String>,
}

impl FileReport {
    pub fn verdict(&self) -> Verdict {
        self.verdict.verdict
    }

    /// True when the recording was too short for a single window.
    pub fn is_no_data(&self) -> bool {
        self.verdict.verdict == Verdict::NoData
    }
}

/// Screening pipeline bound to a configuration and a classifier.
///
/// The classifier is passed in by the caller, so it is loaded once and can be
/// shared across files, and tests can supply a fake.
///
/// ```
/// use eegscreen::{ClassifierError, Classifier, Pipeline, PipelineConfig, RawRecording, Verdict, WindowBatch};
///
/// struct AlwaysHealthy;
///
/// impl Classifier for AlwaysHealthy {
///     fn predict(&self, batch: &WindowBatch) -> Result<Vec<f64>, ClassifierError> {
///         Ok(vec![0.1; batch.len()])
///     }
/// }
///
/// let config = PipelineConfig { bandpass: None, ..PipelineConfig::default() };
/// let pipeline = Pipeline::new(config, AlwaysHealthy)?;
///
/// let samples: Vec<f64> = (0..5000).map(|i| (i as f64 * 0.1).sin()).collect();
/// let recording = RawRecording::new(
///     vec!["Fp1".into(), "Fp2".into()],
///     250.0,
///     vec![samples.clone(), samples],
/// )?;
///
/// let report = pipeline.analyze_recording(&recording)?;
/// assert_eq!(report.segment_count, 2);
/// assert_eq!(report.verdict(), Verdict::Healthy);
/// # Ok::<(), eegscreen::ScreenError>(())
/// ```
pub struct Pipeline<C> {
    config: PipelineConfig,
    selector: ChannelSelector,
    classifier: C,
    cancel: Option<Arc<AtomicBool>>,
}

impl<C: Classifier> Pipeline<C> {
    pub fn new(config: PipelineConfig, classifier: C) -> Result<Self> {
        config.validate()?;
        let selector = ChannelSelector::new(&config.channels, config.label_match);
        Ok(Pipeline {
            config,
            selector,
            classifier,
            cancel: None,
        })
    }

    /// Aborts processing between batches once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn analyze_path<P: AsRef<Path>>(&self, path: P) -> Result<FileReport> {
        self.analyze_source(&EdfFileSource::new(path))
    }

    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<FileReport> {
        self.analyze_source(&EdfBytesSource::new(bytes))
    }

    pub fn analyze_source<S: SignalSource + ?Sized>(&self, source: &S) -> Result<FileReport> {
        // the source is fully read and released before any processing starts
        let recording = source.load()?;
        self.analyze_recording(&recording)
    }

    /// Selected channels after the optional band-pass, ready for windowing.
    pub fn prepare(&self, recording: &RawRecording) -> Result<SelectedSignal> {
        let selected = self.selector.select(recording)?;
        debug!(
            "selected {:?} ({} samples at {} Hz)",
            selected.labels(),
            selected.sample_count(),
            selected.sample_rate()
        );

        match self.config.bandpass {
            Some(band) => {
                let filter = BandPassFilter::new(band, selected.sample_rate())?;
                debug!("band-pass {}–{} Hz", band.low_hz, band.high_hz);
                Ok(selected.map_channels(|ch| filter.apply(ch)))
            }
            None => Ok(selected),
        }
    }

    pub fn segmenter_for(&self, sample_rate: f64) -> Result<Segmenter> {
        let window = self.config.window.resolve(sample_rate)?;
        let stride = self.config.stride.unwrap_or(window);
        Segmenter::with_stride(window, stride)
    }

    pub fn analyze_recording(&self, recording: &RawRecording) -> Result<FileReport> {
        let signal = self.prepare(recording)?;
        let segmenter = self.segmenter_for(signal.sample_rate())?;
        let segment_count = segmenter.count(signal.sample_count());
        debug!(
            "{} windows of {} samples, stride {}",
            segment_count,
            segmenter.window(),
            segmenter.stride()
        );

        let mut scores = Vec::with_capacity(segment_count);
        let mut batch: Vec<NormalizedSegment> = Vec::with_capacity(self.config.batch_size);

        for segment in segmenter.segments(&signal) {
            batch.push(normalize(&segment, self.config.epsilon));
            if batch.len() == self.config.batch_size {
                self.score_batch(&batch, &mut scores)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.score_batch(&batch, &mut scores)?;
        }

        let verdict = aggregate(&scores, self.config.threshold, self.config.aggregation);
        match verdict.verdict {
            Verdict::NoData => warn!(
                "recording has {} samples, shorter than one {}-sample window",
                signal.sample_count(),
                segmenter.window()
            ),
            v => info!(
                "verdict {} ({} abnormal / {} healthy windows, {:?})",
                v,
                verdict.abnormal_segments,
                verdict.healthy_segments,
                self.config.aggregation
            ),
        }

        Ok(FileReport {
            verdict,
            scores,
            segment_count,
            window_samples: segmenter.window(),
            stride_samples: segmenter.stride(),
            sample_rate: signal.sample_rate(),
            channels: signal.labels().to_vec(),
        })
    }

    fn score_batch(&self, batch: &[NormalizedSegment], scores: &mut Vec<f64>) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                warn!("cancelled after {} windows", scores.len());
                return Err(ScreenError::Cancelled);
            }
        }

        let windows = WindowBatch::from_segments(batch).ok_or_else(|| {
            ScreenError::InvalidRecording("windows in one batch differ in shape".to_string())
        })?;
        let predicted = self.classifier.predict(&windows)?;
        scores.extend(check_scores(batch.len(), predicted)?);
        Ok(())
    }

    pub fn aggregation(&self) -> Aggregation {
        self.config.aggregation
    }
}
