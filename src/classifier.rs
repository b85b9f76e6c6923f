//! Inference backend boundary.
//!
//! The pipeline only needs batch-in, scores-out. [`Classifier`] is that
//! contract; [`ProcessClassifier`] fulfils it by handing batches to an
//! external model-serving program, and tests substitute their own fakes.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;
use crate::normalize::NormalizedSegment;

/// Binary classifier over normalized windows.
///
/// Implementations must be deterministic for a fixed model and input, and
/// must return exactly one probability of the positive class per window, in
/// input order.
pub trait Classifier {
    fn predict(&self, batch: &WindowBatch) -> Result<Vec<f64>, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn predict(&self, batch: &WindowBatch) -> Result<Vec<f64>, ClassifierError> {
        (**self).predict(batch)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn predict(&self, batch: &WindowBatch) -> Result<Vec<f64>, ClassifierError> {
        (**self).predict(batch)
    }
}

/// Stacked windows laid out as `(N, channels, window, 1)`, row-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowBatch {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl WindowBatch {
    /// Stacks windows of identical shape. Returns `None` for mismatched shapes.
    pub fn from_segments(segments: &[NormalizedSegment]) -> Option<Self> {
        let (channels, len) = segments
            .first()
            .map_or((0, 0), |s| (s.channel_count(), s.len()));
        if segments
            .iter()
            .any(|s| s.channel_count() != channels || s.len() != len)
        {
            return None;
        }

        let data = segments
            .iter()
            .flat_map(|s| s.as_slice().iter().map(|&v| v as f32))
            .collect();

        Some(WindowBatch {
            shape: [segments.len(), channels, len, 1],
            data,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.shape[0] == 0
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Flat samples of window `i`, channel-major.
    pub fn window(&self, i: usize) -> &[f32] {
        let size = self.shape[1] * self.shape[2];
        &self.data[i * size..(i + 1) * size]
    }
}

/// Enforces the backend contract: one finite probability per window.
pub fn check_scores(expected: usize, scores: Vec<f64>) -> Result<Vec<f64>, ClassifierError> {
    if scores.len() != expected {
        return Err(ClassifierError::LengthMismatch {
            expected,
            got: scores.len(),
        });
    }
    if let Some((index, &value)) = scores
        .iter()
        .enumerate()
        .find(|(_, s)| !(s.is_finite() && (0.0..=1.0).contains(*s)))
    {
        return Err(ClassifierError::InvalidScore { index, value });
    }
    Ok(scores)
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    model: &'a Path,
    shape: [usize; 4],
    data: &'a [f32],
}

#[derive(Deserialize)]
struct PredictResponse {
    scores: Vec<f64>,
}

/// Model served by an external program.
///
/// For every batch the program is started with the configured arguments
/// followed by the model path, receives
/// `{"model": ..., "shape": [N, C, W, 1], "data": [...]}` on stdin and must
/// print `{"scores": [...]}` on stdout and exit successfully. A program that
/// runs longer than the timeout is killed.
#[derive(Debug, Clone)]
pub struct ProcessClassifier {
    program: String,
    args: Vec<String>,
    model: PathBuf,
    timeout: Duration,
}

impl ProcessClassifier {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Fails with [`ClassifierError::ModelMissing`] if the artifact is absent.
    pub fn new<P: AsRef<Path>>(program: &str, model: P) -> Result<Self, ClassifierError> {
        let model = model.as_ref().to_path_buf();
        if !model.exists() {
            return Err(ClassifierError::ModelMissing(model.display().to_string()));
        }
        Ok(ProcessClassifier {
            program: program.to_string(),
            args: Vec::new(),
            model,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, payload: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>), ClassifierError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClassifierError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // pipes are drained on their own threads so a chatty backend cannot stall
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // a backend that exits early closes the pipe; its exit status reports why
                let _ = stdin.write_all(&payload);
            }
        });
        let stdout = child.stdout.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let stderr = child.stderr.take();
        let err_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!("backend '{}' exceeded {:?}, killing it", self.program, self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    // Not joined: a grandchild that inherited the pipes can keep them
                    // open after the kill. Each thread ends once the last holder of
                    // its pipe exits, and nothing it reads is used.
                    drop((writer, out_reader, err_reader));
                    return Err(ClassifierError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                Err(e) => return Err(ClassifierError::Backend(format!("wait failed: {}", e))),
            }
        };

        let _ = writer.join();
        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();

        if !status.success() {
            let detail = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(ClassifierError::Backend(format!("exited with {}: {}", status, detail)));
        }
        Ok((stdout, stderr))
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

impl Classifier for ProcessClassifier {
    fn predict(&self, batch: &WindowBatch) -> Result<Vec<f64>, ClassifierError> {
        let request = PredictRequest {
            model: &self.model,
            shape: batch.shape(),
            data: batch.data(),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ClassifierError::BadOutput(format!("cannot encode batch: {}", e)))?;

        let started = Instant::now();
        let (stdout, _) = self.run(payload)?;
        debug!(
            "backend scored {} windows in {:?}",
            batch.len(),
            started.elapsed()
        );

        let response: PredictResponse = serde_json::from_slice(&stdout)
            .map_err(|e| ClassifierError::BadOutput(e.to_string()))?;
        check_scores(batch.len(), response.scores)
    }
}
