//! Per-channel, per-window min-max scaling.

use crate::segment::Segment;

/// Added to each row's range so a flat row scales to zeros instead of NaN.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// A window with every row rescaled to `[0, 1]`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSegment {
    index: usize,
    channels: usize,
    len: usize,
    data: Vec<f64>,
}

impl NormalizedSegment {
    /// Position of the source window in the sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn row(&self, channel: usize) -> &[f64] {
        &self.data[channel * self.len..(channel + 1) * self.len]
    }

    /// All rows back to back, channel-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Scales each row with its own minimum and maximum inside the window:
/// `(x - min) / (max - min + epsilon)`.
pub fn normalize(segment: &Segment<'_>, epsilon: f64) -> NormalizedSegment {
    let len = segment.len();
    let mut data = Vec::with_capacity(segment.channel_count() * len);

    for row in segment.rows() {
        let (min, max) = row
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let scale = max - min + epsilon;
        data.extend(row.iter().map(|&x| (x - min) / scale));
    }

    NormalizedSegment {
        index: segment.index(),
        channels: segment.channel_count(),
        len,
        data,
    }
}
