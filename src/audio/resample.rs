use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::buffer::AudioBuffer;

/// Sinc-resamples every channel of `buffer` to `target_rate`.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate() == target_rate || buffer.is_empty() {
        return Ok(buffer.clone());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / buffer.sample_rate() as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        params,
        buffer.len(),
        buffer.num_channels(),
    )
    .context("Failed to create resampler")?;

    let input: Vec<Vec<f32>> = (0..buffer.num_channels())
        .map(|i| buffer.channel(i).map(<[f32]>::to_vec))
        .collect::<Result<_, _>>()?;
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    log::info!(
        "Resampled {}Hz -> {}Hz ({} -> {} samples)",
        buffer.sample_rate(),
        target_rate,
        buffer.len(),
        output.first().map_or(0, Vec::len)
    );

    Ok(AudioBuffer::new(output, target_rate))
}
