//! Fixed-length windows along the time axis.

use std::iter::FusedIterator;

use crate::error::{Result, ScreenError};
use crate::select::SelectedSignal;

/// Cuts windows of `window` samples every `stride` samples.
///
/// A trailing remainder shorter than one window is dropped, never padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    window: usize,
    stride: usize,
}

impl Segmenter {
    /// Non-overlapping windows.
    pub fn new(window: usize) -> Result<Self> {
        Self::with_stride(window, window)
    }

    pub fn with_stride(window: usize, stride: usize) -> Result<Self> {
        if window == 0 || stride == 0 {
            return Err(ScreenError::InvalidConfig(format!(
                "window ({}) and stride ({}) must be at least one sample",
                window, stride
            )));
        }
        Ok(Segmenter { window, stride })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `floor((len - window) / stride) + 1` when at least one window fits, else 0.
    pub fn count(&self, sample_count: usize) -> usize {
        if sample_count < self.window {
            0
        } else {
            (sample_count - self.window) / self.stride + 1
        }
    }

    /// Lazy view over the windows of `signal`. Each call starts from the
    /// beginning; iterators share no state.
    pub fn segments<'a>(&self, signal: &'a SelectedSignal) -> Segments<'a> {
        Segments {
            signal,
            window: self.window,
            stride: self.stride,
            next: 0,
            total: self.count(signal.sample_count()),
        }
    }
}

/// One window: `channel_count` rows of `len` samples, borrowed from the signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a> {
    index: usize,
    start: usize,
    rows: Vec<&'a [f64]>,
}

impl<'a> Segment<'a> {
    /// Builds a segment from explicit rows of equal length.
    pub fn from_rows(index: usize, start: usize, rows: Vec<&'a [f64]>) -> Result<Self> {
        if let Some(first) = rows.first() {
            if rows.iter().any(|r| r.len() != first.len()) {
                return Err(ScreenError::InvalidRecording(
                    "segment rows differ in length".to_string(),
                ));
            }
        }
        Ok(Segment { index, start, rows })
    }

    /// Position of this window in the sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    /// First sample of the window in the source signal.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn rows(&self) -> &[&'a [f64]] {
        &self.rows
    }

    pub fn channel_count(&self) -> usize {
        self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Segments<'a> {
    signal: &'a SelectedSignal,
    window: usize,
    stride: usize,
    next: usize,
    total: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        let start = index * self.stride;
        let end = start + self.window;
        self.next += 1;

        Some(Segment {
            index,
            start,
            rows: self.signal.channels().iter().map(|ch| &ch[start..end]).collect(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Segments<'_> {}

impl FusedIterator for Segments<'_> {}
