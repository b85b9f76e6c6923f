use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures while decoding an EDF/EDF+ file into signal arrays.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not an EDF file: {0}")]
    NotEdf(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(i64),

    #[error("File declares no ordinary signals")]
    NoSignals,

    #[error("Signal '{0}': physical min equals physical max")]
    PhysicalMinEqualsMax(String),

    #[error("Signal '{0}': digital min equals digital max")]
    DigitalMinEqualsMax(String),

    #[error("Discontinuous EDF+D files are not supported")]
    Discontinuous,

    #[error("Truncated data: header declares {declared} data records, file holds {available}")]
    Truncated { declared: i64, available: i64 },
}

/// Failures of the inference backend.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model artifact not found: {0}")]
    ModelMissing(String),

    #[error("Failed to start backend '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend failed: {0}")]
    Backend(String),

    #[error("Malformed backend output: {0}")]
    BadOutput(String),

    #[error("Backend returned {got} scores for {expected} windows")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Score {value} at window {index} is not a probability")]
    InvalidScore { index: usize, value: f64 },
}

/// Request-level error taxonomy.
///
/// Every stage propagates its failure unchanged; nothing collapses into a
/// generic "could not process" result. A recording too short for a single
/// window is not an error: it yields [`crate::Verdict::NoData`].
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("Could not read EDF source: {0}")]
    SourceRead(#[from] ReadError),

    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    #[error("Channel '{0}' not found in recording")]
    ChannelNotFound(String),

    #[error("Channel '{label}' matches several channels: {candidates:?}")]
    AmbiguousChannel {
        label: String,
        candidates: Vec<String>,
    },

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(#[from] ClassifierError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Processing cancelled")]
    Cancelled,
}

/// Coarse classification of a [`ScreenError`] for callers that only need to
/// decide what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The uploaded file or its channels are unusable.
    BadInput,
    /// The pipeline was configured inconsistently.
    Configuration,
    /// The model or inference backend failed; retrying later may help.
    BackendUnavailable,
    Cancelled,
}

impl ScreenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScreenError::SourceRead(_)
            | ScreenError::InvalidRecording(_)
            | ScreenError::ChannelNotFound(_)
            | ScreenError::AmbiguousChannel { .. } => ErrorKind::BadInput,
            ScreenError::InvalidConfig(_) => ErrorKind::Configuration,
            ScreenError::ClassifierUnavailable(_) => ErrorKind::BackendUnavailable,
            ScreenError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Message suitable for showing to the person who submitted the file.
    pub fn user_message(&self) -> String {
        match self {
            ScreenError::SourceRead(e) => {
                format!("The file could not be read as an EDF recording ({}). Check that it is a complete, uncorrupted .edf file.", e)
            }
            ScreenError::InvalidRecording(msg) => {
                format!("The recording is internally inconsistent ({}). Re-export it from the acquisition software.", msg)
            }
            ScreenError::ChannelNotFound(label) => {
                format!("The recording has no '{}' channel. Upload a recording that includes it, or configure a different channel set.", label)
            }
            ScreenError::AmbiguousChannel { label, candidates } => {
                format!("'{}' matches several channels ({}). Use exact channel labels in the configuration.", label, candidates.join(", "))
            }
            ScreenError::ClassifierUnavailable(e) => {
                format!("The analysis model is currently unavailable ({}). Please try again later.", e)
            }
            ScreenError::InvalidConfig(msg) => {
                format!("The analyzer is misconfigured: {}.", msg)
            }
            ScreenError::Cancelled => "Analysis was cancelled before it finished.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScreenError>;
