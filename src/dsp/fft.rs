use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;

use crate::error::AnalysisError;

/// Taper applied to a frame before the transform.
///
/// The spectrogram and onset paths default to `Rectangular` (no taper);
/// `Hann` and `Hamming` are opt-in through the config.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    #[default]
    Rectangular,
    Hann,
    Hamming,
}

impl WindowFunction {
    /// Coefficients for a frame of `size` samples, or `None` for rectangular.
    pub fn coefficients(self, size: usize) -> Option<Vec<f32>> {
        let denom = size.saturating_sub(1).max(1) as f32;
        let two_pi = 2.0 * std::f32::consts::PI;
        match self {
            WindowFunction::Rectangular => None,
            WindowFunction::Hann => Some(
                (0..size)
                    .map(|i| 0.5 * (1.0 - (two_pi * i as f32 / denom).cos()))
                    .collect(),
            ),
            WindowFunction::Hamming => Some(
                (0..size)
                    .map(|i| 0.54 - 0.46 * (two_pi * i as f32 / denom).cos())
                    .collect(),
            ),
        }
    }
}

/// Forward power-spectrum transform of fixed-size frames.
///
/// Bins are scaled as `2 * |X[k]| / N` before squaring, so a full-scale sine
/// centred on a bin yields a power of 1.0 in that bin.
pub struct FftEngine {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Option<Vec<f32>>,
}

impl FftEngine {
    pub fn new(size: usize, window: WindowFunction) -> Result<Self, AnalysisError> {
        if size < 2 || !size.is_power_of_two() {
            return Err(AnalysisError::InvalidConfig(format!(
                "FFT size must be a power of two >= 2, got {}",
                size
            )));
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        Ok(Self {
            size,
            fft,
            window: window.coefficients(size),
        })
    }

    /// Number of bins in every spectrum this engine produces.
    pub fn bins(&self) -> usize {
        self.size / 2
    }

    /// Writes the power spectrum of `frame` into `out`, which must hold `bins()` values.
    pub fn forward_into(&self, frame: &[f32], out: &mut [f32]) -> Result<(), AnalysisError> {
        if frame.len() != self.size {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.size,
                actual: frame.len(),
            });
        }
        if out.len() != self.bins() {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.bins(),
                actual: out.len(),
            });
        }

        let mut buffer: Vec<Complex<f32>> = match &self.window {
            Some(w) => frame
                .iter()
                .zip(w.iter())
                .map(|(&s, &c)| Complex::new(s * c, 0.0))
                .collect(),
            None => frame.iter().map(|&s| Complex::new(s, 0.0)).collect(),
        };
        self.fft.process(&mut buffer);

        let scale = 2.0 / self.size as f32;
        for (bin, c) in out.iter_mut().zip(buffer.iter()) {
            let magnitude = c.norm() * scale;
            *bin = magnitude * magnitude;
        }
        Ok(())
    }
}

#[cfg(test)]
impl FftEngine {
    pub fn forward(&self, frame: &[f32]) -> Result<Vec<f32>, AnalysisError> {
        let mut spectrum = vec![0.0f32; self.bins()];
        self.forward_into(frame, &mut spectrum)?;
        Ok(spectrum)
    }
}
