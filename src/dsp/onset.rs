//! Spectral-flux onset detection.
//!
//! The channel is cut into back-to-back frames, each frame's power spectrum is
//! compared with the previous one, and the rectified increase (flux) is
//! peak-picked against a moving-average threshold. The resulting list is
//! bracketed by `0.0` and the buffer duration, both in milliseconds.

use super::fft::{FftEngine, WindowFunction};
use crate::audio::buffer::AudioBuffer;
use crate::config::OnsetConfig;
use crate::error::AnalysisError;

/// Onset timestamps in milliseconds, starting at 0.0 and ending at the buffer duration.
pub fn detect(buffer: &AudioBuffer, config: &OnsetConfig) -> Result<Vec<f64>, AnalysisError> {
    let sample_rate = buffer.sample_rate();
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidConfig("sample rate must be > 0".into()));
    }
    let samples = buffer.channel(config.channel)?;

    let flux = spectral_flux(samples, config.frame_size, config.window)?;
    let threshold = adaptive_threshold(&flux, config.window_radius, config.multiplier);
    let pruned = prune(&flux, &threshold);
    let peaks = pick_peaks(&pruned);

    let onsets = emit_onsets(
        &peaks,
        config.frame_size,
        sample_rate,
        config.min_spacing_ms,
        buffer.duration_ms(),
    );

    log::debug!(
        "Onset detection: {} frames of {} samples, {} interior onsets",
        flux.len(),
        config.frame_size,
        onsets.len().saturating_sub(2)
    );

    Ok(onsets)
}

/// Half-wave rectified spectral flux of consecutive non-overlapping frames.
///
/// A trailing partial frame is ignored. The first frame is compared against silence.
pub fn spectral_flux(
    samples: &[f32],
    frame_size: usize,
    window: WindowFunction,
) -> Result<Vec<f32>, AnalysisError> {
    let engine = FftEngine::new(frame_size, window)?;
    let mut current = vec![0.0f32; engine.bins()];
    let mut previous = vec![0.0f32; engine.bins()];

    let mut flux = Vec::with_capacity(samples.len() / frame_size);
    for frame in samples.chunks_exact(frame_size) {
        engine.forward_into(frame, &mut current)?;
        let value: f32 = current
            .iter()
            .zip(previous.iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        flux.push(value);
        std::mem::swap(&mut current, &mut previous);
    }
    Ok(flux)
}

/// `multiplier` times the mean of `flux` over `[i - radius, i + radius]`, clamped to the ends.
pub fn adaptive_threshold(flux: &[f32], radius: usize, multiplier: f32) -> Vec<f32> {
    let n = flux.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = i.saturating_add(radius).min(n - 1);
            let window = &flux[start..=end];
            multiplier * window.iter().sum::<f32>() / window.len() as f32
        })
        .collect()
}

pub fn prune(flux: &[f32], threshold: &[f32]) -> Vec<f32> {
    flux.iter()
        .zip(threshold.iter())
        .map(|(f, t)| (f - t).max(0.0))
        .collect()
}

/// Keeps a value only if it is strictly greater than its successor.
///
/// Only the next value is compared; the last value has no successor and is dropped.
pub fn pick_peaks(pruned: &[f32]) -> Vec<f32> {
    (0..pruned.len())
        .map(|i| match pruned.get(i + 1) {
            Some(&next) if pruned[i] > next => pruned[i],
            _ => 0.0,
        })
        .collect()
}

/// Turns rising edges of `peaks` into millisecond timestamps.
///
/// An edge closer than `min_spacing_ms` to the last emitted onset (initially 0.0)
/// is skipped, so the spacing check can swallow several edges in a row.
pub fn emit_onsets(
    peaks: &[f32],
    frame_size: usize,
    sample_rate: u32,
    min_spacing_ms: f64,
    duration_ms: f64,
) -> Vec<f64> {
    let frame_ms = frame_size as f64 / sample_rate as f64 * 1000.0;

    let mut onsets = vec![0.0];
    let mut last = 0.0;
    for i in 1..peaks.len() {
        if peaks[i] > 0.0 && peaks[i - 1] == 0.0 {
            let onset = i as f64 * frame_ms;
            if onset - last > min_spacing_ms {
                onsets.push(onset);
                last = onset;
            }
        }
    }
    onsets.push(duration_ms);
    onsets
}
