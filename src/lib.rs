//! # eegscreen
//!
//! Screening of EEG recordings stored as EDF/EDF+ files with a binary
//! window classifier.
//!
//! A recording is decoded into physical units, a fixed list of channels is
//! picked by label, band-pass filtered, cut into fixed-length windows, and
//! each window is min-max scaled per channel. Windows are scored in batches
//! by a [`Classifier`] supplied by the caller, and the scores are reduced to
//! one [`Verdict`] for the file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use eegscreen::{Pipeline, PipelineConfig, ProcessClassifier, Verdict};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let classifier = ProcessClassifier::new("python3", "schizophrenia_model.keras")?
//!     .args(["serve_batch.py"]);
//! let pipeline = Pipeline::new(PipelineConfig::default(), classifier)?;
//!
//! let report = pipeline.analyze_path("subject01.edf")?;
//! match report.verdict() {
//!     Verdict::NoData => println!("recording too short for one window"),
//!     v => println!(
//!         "{}: {} abnormal / {} healthy windows",
//!         v, report.verdict.abnormal_segments, report.verdict.healthy_segments
//!     ),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Failures are reported as [`ScreenError`], which keeps unreadable files,
//! missing channels, configuration mistakes and backend outages apart so a
//! caller can tell the user what to do. A recording shorter than one window
//! is not an error; it produces [`Verdict::NoData`].

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod segment;
pub mod select;
pub mod source;
pub mod types;
pub mod utils;
pub mod writer;

pub use aggregate::{aggregate, Aggregation, FileVerdict, Verdict};
pub use classifier::{Classifier, ProcessClassifier, WindowBatch};
pub use config::{BandPass, PipelineConfig, WindowLength};
pub use error::{ClassifierError, ErrorKind, ReadError, Result, ScreenError};
pub use filter::BandPassFilter;
pub use normalize::{normalize, NormalizedSegment};
pub use pipeline::{FileReport, Pipeline};
pub use reader::EdfReader;
pub use segment::{Segment, Segmenter, Segments};
pub use select::{ChannelSelector, LabelMatch, SelectedSignal};
pub use source::{inspect, EdfBytesSource, EdfFileSource, RecordingInfo, SignalSource};
pub use types::{EdfHeader, FileType, RawRecording, SignalParam};
pub use writer::{write_recording, EdfWriter};

/// EDF time unit: 100 nanoseconds.
pub const EDF_TIME_DIMENSION: i64 = 10_000_000;
pub const EDF_MAX_SIGNALS: usize = 4096;

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
