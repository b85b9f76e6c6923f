//! Zero-phase Butterworth band-pass.
//!
//! A second-order high-pass and a second-order low-pass section (bilinear
//! transform) are cascaded and run forward then backward over the whole
//! channel, which cancels the phase shift and doubles the attenuation.

use std::f64::consts::{PI, SQRT_2};

use crate::config::BandPass;
use crate::error::{Result, ScreenError};

/// Biquad coefficients, `a0` normalised to 1.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(fs: f64, fc: f64) -> Self {
        let wc = (PI * fc / fs).tan();
        let wc2 = wc * wc;
        let k = 1.0 + SQRT_2 * wc + wc2;
        Biquad {
            b0: wc2 / k,
            b1: 2.0 * wc2 / k,
            b2: wc2 / k,
            a1: 2.0 * (wc2 - 1.0) / k,
            a2: (1.0 - SQRT_2 * wc + wc2) / k,
        }
    }

    fn highpass(fs: f64, fc: f64) -> Self {
        let wc = (PI * fc / fs).tan();
        let wc2 = wc * wc;
        let k = 1.0 + SQRT_2 * wc + wc2;
        Biquad {
            b0: 1.0 / k,
            b1: -2.0 / k,
            b2: 1.0 / k,
            a1: 2.0 * (wc2 - 1.0) / k,
            a2: (1.0 - SQRT_2 * wc + wc2) / k,
        }
    }

    /// Direct form I, state initialised to the first sample's steady state
    /// so a DC offset does not ring at the start.
    fn run(&self, signal: &[f64]) -> Vec<f64> {
        let Some(&first) = signal.first() else {
            return Vec::new();
        };
        let dc_gain = (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2);
        let (mut x1, mut x2) = (first, first);
        let (mut y1, mut y2) = (first * dc_gain, first * dc_gain);

        signal
            .iter()
            .map(|&x0| {
                let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
                x2 = x1;
                x1 = x0;
                y2 = y1;
                y1 = y0;
                y0
            })
            .collect()
    }
}

/// Band-pass filter bound to a sample rate.
#[derive(Debug, Clone, Copy)]
pub struct BandPassFilter {
    highpass: Biquad,
    lowpass: Biquad,
}

impl BandPassFilter {
    /// Fails when the band does not fit below the Nyquist frequency.
    pub fn new(band: BandPass, sample_rate: f64) -> Result<Self> {
        let nyquist = sample_rate / 2.0;
        if !(band.low_hz > 0.0 && band.low_hz < band.high_hz && band.high_hz < nyquist) {
            return Err(ScreenError::InvalidConfig(format!(
                "band-pass {}–{} Hz does not fit a {} Hz recording (Nyquist {} Hz)",
                band.low_hz, band.high_hz, sample_rate, nyquist
            )));
        }
        Ok(BandPassFilter {
            highpass: Biquad::highpass(sample_rate, band.low_hz),
            lowpass: Biquad::lowpass(sample_rate, band.high_hz),
        })
    }

    /// Filters one channel; output has the same length as the input.
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        let forward = self.lowpass.run(&self.highpass.run(signal));

        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        reversed = self.lowpass.run(&self.highpass.run(&reversed));
        reversed.reverse();
        reversed
    }
}
