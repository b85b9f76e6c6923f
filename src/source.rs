//! Where recordings come from.
//!
//! [`SignalSource`] is the seam between the pipeline and EDF decoding. The
//! file-backed source opens the file, decodes it and drops the handle before
//! returning, so nothing stays open while the rest of the pipeline runs.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

use crate::error::Result;
use crate::reader::EdfReader;
use crate::types::RawRecording;

/// Anything that can produce a [`RawRecording`].
pub trait SignalSource {
    fn load(&self) -> Result<RawRecording>;
}

/// EDF file on disk.
#[derive(Debug, Clone)]
pub struct EdfFileSource {
    path: PathBuf,
}

impl EdfFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        EdfFileSource {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SignalSource for EdfFileSource {
    fn load(&self) -> Result<RawRecording> {
        debug!("reading EDF file {}", self.path.display());
        let mut reader = EdfReader::open(&self.path)?;
        reader.read_recording()
    }
}

/// EDF file already held in memory, e.g. an upload body.
#[derive(Debug, Clone, Copy)]
pub struct EdfBytesSource<'a> {
    bytes: &'a [u8],
}

impl<'a> EdfBytesSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        EdfBytesSource { bytes }
    }
}

impl SignalSource for EdfBytesSource<'_> {
    fn load(&self) -> Result<RawRecording> {
        debug!("reading EDF buffer of {} bytes", self.bytes.len());
        let mut reader = EdfReader::from_bytes(self.bytes)?;
        reader.read_recording()
    }
}

impl SignalSource for RawRecording {
    fn load(&self) -> Result<RawRecording> {
        Ok(self.clone())
    }
}

/// Summary of an EDF file's signals, read from the header alone.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub channel_count: usize,
    pub labels: Vec<String>,
    /// Per-channel sampling frequency in Hz, same order as `labels`.
    pub sample_rates: Vec<f64>,
    pub duration_seconds: f64,
    pub start: Option<NaiveDateTime>,
}

/// Reads channel count, labels, sample rates and duration without decoding samples.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<RecordingInfo> {
    let reader = EdfReader::open(path)?;
    let header = reader.header();

    Ok(RecordingInfo {
        channel_count: header.signals.len(),
        labels: header.signals.iter().map(|s| s.label.clone()).collect(),
        sample_rates: (0..header.signals.len())
            .map(|i| header.sample_rate(i).unwrap_or(0.0))
            .collect(),
        duration_seconds: header.duration_seconds(),
        start: header.start,
    })
}
