use serde::Serialize;

use super::fft::FftEngine;
use super::mel::{FilterbankCache, MelFilterbank};
use crate::audio::buffer::AudioBuffer;
use crate::config::SpectrogramConfig;
use crate::error::AnalysisError;

/// Frames x mel bands, in dB relative to the loudest entry (which is 0.0).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
    mel_count: usize,
}

impl Spectrogram {
    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn mel_count(&self) -> usize {
        self.mel_count
    }

    /// Transposes into a `mel_count x spec_length` matrix for a classifier.
    ///
    /// Frames past `spec_length` are dropped; missing frames are filled with `floor_db`.
    pub fn to_model_input(&self, spec_length: usize, floor_db: f32) -> Vec<Vec<f32>> {
        let mut input = vec![vec![floor_db; spec_length]; self.mel_count];
        for (j, frame) in self.frames.iter().take(spec_length).enumerate() {
            for (band, &db) in frame.iter().enumerate() {
                input[band][j] = db;
            }
        }
        input
    }
}

/// Number of full frames that fit between two sample offsets.
pub fn frame_count(
    start_sample: usize,
    end_sample: usize,
    fft_size: usize,
    hop_size: usize,
) -> usize {
    end_sample.saturating_sub(start_sample).saturating_sub(fft_size) / hop_size
}

/// Log-mel spectrogram of the first channel between `start_ms` and `end_ms`.
pub fn generate(
    buffer: &AudioBuffer,
    start_ms: f64,
    end_ms: f64,
    config: &SpectrogramConfig,
    cache: &FilterbankCache,
) -> Result<Spectrogram, AnalysisError> {
    let sample_rate = buffer.sample_rate();
    let bank = cache.get_or_build(
        config.fft_size / 2,
        config.mel_count,
        config.low_freq_hz,
        config.high_freq_for(sample_rate),
        sample_rate,
        config.degenerate_filters,
    )?;
    generate_with_filterbank(buffer, start_ms, end_ms, config, &bank)
}

/// Same as [`generate`], with a caller-supplied filterbank whose width must be `fft_size / 2`.
pub fn generate_with_filterbank(
    buffer: &AudioBuffer,
    start_ms: f64,
    end_ms: f64,
    config: &SpectrogramConfig,
    bank: &MelFilterbank,
) -> Result<Spectrogram, AnalysisError> {
    let duration_ms = buffer.duration_ms();
    if !(start_ms >= 0.0 && start_ms <= end_ms && end_ms <= duration_ms) {
        return Err(AnalysisError::InvalidRange {
            start: start_ms,
            end: end_ms,
            duration: duration_ms,
        });
    }
    if config.hop_size == 0 {
        return Err(AnalysisError::InvalidConfig("hop size must be > 0".into()));
    }

    let engine = FftEngine::new(config.fft_size, config.window)?;
    if bank.fft_bins() != engine.bins() {
        return Err(AnalysisError::DimensionMismatch {
            expected: bank.fft_bins(),
            actual: engine.bins(),
        });
    }

    let samples = buffer.channel(0)?;
    let sr = buffer.sample_rate() as f64;
    let start_sample = (start_ms / 1000.0 * sr).floor() as usize;
    let end_sample = ((end_ms / 1000.0 * sr).floor() as usize).min(samples.len());
    let num_frames = frame_count(start_sample, end_sample, config.fft_size, config.hop_size);
    let mel_count = bank.num_filters();

    log::debug!(
        "Spectrogram: samples {}..{}, {} frames x {} bands (fft={}, hop={})",
        start_sample,
        end_sample,
        num_frames,
        mel_count,
        config.fft_size,
        config.hop_size
    );

    let mut spectrum = vec![0.0f32; engine.bins()];
    let mut frames: Vec<Vec<f32>> = Vec::with_capacity(num_frames);
    let mut max_db = f32::NEG_INFINITY;

    for frame_idx in 0..num_frames {
        let offset = start_sample + frame_idx * config.hop_size;
        engine.forward_into(&samples[offset..offset + config.fft_size], &mut spectrum)?;

        let mut bands = vec![0.0f32; mel_count];
        bank.apply(&spectrum, &mut bands)?;

        for (band, value) in bands.iter_mut().enumerate() {
            let db = 10.0 * (*value + config.silence_epsilon).log10();
            if !db.is_finite() {
                return Err(AnalysisError::NonFinite {
                    frame: frame_idx,
                    band,
                });
            }
            *value = db;
            max_db = max_db.max(db);
        }
        frames.push(bands);
    }

    for frame in &mut frames {
        for db in frame.iter_mut() {
            *db -= max_db;
        }
    }

    Ok(Spectrogram { frames, mel_count })
}

#[cfg(test)]
impl Spectrogram {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_db(&self) -> Option<f32> {
        self.frames
            .iter()
            .flatten()
            .copied()
            .reduce(f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::mel::DegeneratePolicy;

    const SR: u32 = 16000;

    fn tone(seconds: f64, hz: f32) -> AudioBuffer {
        let len = (seconds * SR as f64) as usize;
        let samples = (0..len)
            .map(|n| 0.5 * (2.0 * std::f32::consts::PI * hz * n as f32 / SR as f32).sin())
            .collect();
        AudioBuffer::mono(samples, SR)
    }

    fn config(mel_count: usize) -> SpectrogramConfig {
        SpectrogramConfig {
            mel_count,
            ..SpectrogramConfig::default()
        }
    }

    #[test]
    fn loudest_entry_is_zero_db() {
        let buffer = tone(1.0, 440.0);
        let cache = FilterbankCache::new();
        let spec = generate(&buffer, 0.0, 500.0, &config(96), &cache).unwrap();

        assert_eq!(spec.len(), frame_count(0, 8000, 1024, 256));
        assert_eq!(spec.len(), 27);
        assert_eq!(spec.mel_count(), 96);
        assert_eq!(spec.max_db(), Some(0.0));
        assert!(spec.frames().iter().flatten().all(|&db| db <= 0.0));
        assert!(spec.frames().iter().all(|f| f.len() == 96));
    }

    #[test]
    fn offset_range_counts_frames() {
        let buffer = tone(2.0, 1000.0);
        let cache = FilterbankCache::new();
        let spec = generate(&buffer, 250.0, 1250.0, &config(64), &cache).unwrap();
        // 4000..20000 samples
        assert_eq!(spec.len(), (16000 - 1024) / 256);
        assert_eq!(spec.max_db(), Some(0.0));
    }

    #[test]
    fn short_range_is_empty() {
        let buffer = tone(1.0, 440.0);
        let cache = FilterbankCache::new();
        // 50 ms = 800 samples < 1024
        let spec = generate(&buffer, 100.0, 150.0, &config(96), &cache).unwrap();
        assert!(spec.is_empty());
        assert_eq!(spec.max_db(), None);
    }

    #[test]
    fn out_of_bounds_range_is_rejected() {
        let buffer = tone(1.0, 440.0);
        let cache = FilterbankCache::new();
        let err = generate(&buffer, 600.0, 200.0, &config(96), &cache).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRange { .. }));
        let err = generate(&buffer, 0.0, 1500.0, &config(96), &cache).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRange { .. }));
    }

    #[test]
    fn mismatched_filterbank_aborts() {
        let buffer = tone(1.0, 440.0);
        let bank = MelFilterbank::build(256, 40, 0.0, 8000.0, SR, DegeneratePolicy::Clamp).unwrap();
        let err = generate_with_filterbank(&buffer, 0.0, 1000.0, &config(40), &bank).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::DimensionMismatch {
                expected: 256,
                actual: 512
            }
        );
    }

    #[test]
    fn zero_epsilon_on_silence_is_non_finite() {
        let buffer = AudioBuffer::mono(vec![0.0; 4096], SR);
        let cache = FilterbankCache::new();
        let cfg = SpectrogramConfig {
            silence_epsilon: 0.0,
            ..config(40)
        };
        let err = generate(&buffer, 0.0, 256.0, &cfg, &cache).unwrap_err();
        assert_eq!(err, AnalysisError::NonFinite { frame: 0, band: 0 });
    }

    #[test]
    fn silence_with_epsilon_is_flat() {
        let buffer = AudioBuffer::mono(vec![0.0; 4096], SR);
        let cache = FilterbankCache::new();
        let spec = generate(&buffer, 0.0, 256.0, &config(40), &cache).unwrap();
        assert!(!spec.is_empty());
        assert!(spec.frames().iter().flatten().all(|&db| db == 0.0));
    }

    #[test]
    fn model_input_pads_and_transposes() {
        let buffer = tone(1.0, 440.0);
        let cache = FilterbankCache::new();
        let spec = generate(&buffer, 0.0, 200.0, &config(128), &cache).unwrap();
        let frames = spec.len();
        assert!(frames > 0 && frames < 32);

        let input = spec.to_model_input(32, -80.0);
        assert_eq!(input.len(), 128);
        assert!(input.iter().all(|row| row.len() == 32));
        assert_eq!(input[5][0], spec.frames()[0][5]);
        assert_eq!(input[7][frames - 1], spec.frames()[frames - 1][7]);
        assert!(input.iter().all(|row| row[frames..].iter().all(|&v| v == -80.0)));

        let truncated = spec.to_model_input(2, -80.0);
        assert!(truncated.iter().all(|row| row.len() == 2));
    }
}
