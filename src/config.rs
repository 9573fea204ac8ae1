use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dsp::fft::WindowFunction;
use crate::dsp::mel::DegeneratePolicy;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spectrogram: SpectrogramConfig,
    #[serde(default)]
    pub onset: OnsetConfig,
    #[serde(default)]
    pub model_input: ModelInputConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpectrogramConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_mel_count")]
    pub mel_count: usize,
    #[serde(default)]
    pub low_freq_hz: f32,
    /// Upper filterbank edge; Nyquist when unset.
    #[serde(default)]
    pub high_freq_hz: Option<f32>,
    #[serde(default = "default_silence_epsilon")]
    pub silence_epsilon: f32,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default)]
    pub degenerate_filters: DegeneratePolicy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OnsetConfig {
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: f64,
    #[serde(default)]
    pub channel: usize,
    #[serde(default)]
    pub window: WindowFunction,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelInputConfig {
    #[serde(default = "default_spec_length")]
    pub spec_length: usize,
    #[serde(default = "default_floor_db")]
    pub floor_db: f32,
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            hop_size: default_hop_size(),
            mel_count: default_mel_count(),
            low_freq_hz: 0.0,
            high_freq_hz: None,
            silence_epsilon: default_silence_epsilon(),
            window: WindowFunction::default(),
            degenerate_filters: DegeneratePolicy::default(),
        }
    }
}

impl SpectrogramConfig {
    pub fn high_freq_for(&self, sample_rate: u32) -> f32 {
        self.high_freq_hz.unwrap_or(sample_rate as f32 / 2.0)
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            frame_size: default_frame_size(),
            window_radius: default_window_radius(),
            multiplier: default_multiplier(),
            min_spacing_ms: default_min_spacing_ms(),
            channel: 0,
            window: WindowFunction::default(),
        }
    }
}

impl Default for ModelInputConfig {
    fn default() -> Self {
        Self {
            spec_length: default_spec_length(),
            floor_db: default_floor_db(),
            target_sample_rate: default_target_sample_rate(),
        }
    }
}

fn default_fft_size() -> usize { 1024 }
fn default_hop_size() -> usize { 256 }
fn default_mel_count() -> usize { 128 }
fn default_silence_epsilon() -> f32 { 1e-9 }
fn default_frame_size() -> usize { 1024 }
fn default_window_radius() -> usize { 10 }
fn default_multiplier() -> f32 { 1.5 }
fn default_min_spacing_ms() -> f64 { 150.0 }
fn default_spec_length() -> usize { 32 }
fn default_floor_db() -> f32 { -80.0 }
fn default_target_sample_rate() -> u32 { 22100 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path first, then `melonset.toml` in the working directory, then the user config dirs.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("melonset.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("melonset").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("melonset").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.spectrogram.fft_size, 1024);
        assert_eq!(cfg.spectrogram.hop_size, 256);
        assert_eq!(cfg.spectrogram.mel_count, 128);
        assert_eq!(cfg.spectrogram.window, WindowFunction::Rectangular);
        assert_eq!(cfg.onset.frame_size, 1024);
        assert_eq!(cfg.onset.window_radius, 10);
        assert_eq!(cfg.onset.multiplier, 1.5);
        assert_eq!(cfg.model_input.spec_length, 32);
        assert_eq!(cfg.model_input.floor_db, -80.0);
        assert_eq!(cfg.spectrogram.high_freq_for(22050), 11025.0);
    }

    #[test]
    fn partial_sections_override() {
        let cfg: Config = toml::from_str(
            r#"
            [spectrogram]
            mel_count = 96
            window = "hann"
            high_freq_hz = 8000.0
            degenerate_filters = "reject"

            [onset]
            min_spacing_ms = 100.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.spectrogram.mel_count, 96);
        assert_eq!(cfg.spectrogram.fft_size, 1024);
        assert_eq!(cfg.spectrogram.window, WindowFunction::Hann);
        assert_eq!(cfg.spectrogram.degenerate_filters, DegeneratePolicy::Reject);
        assert_eq!(cfg.spectrogram.high_freq_for(44100), 8000.0);
        assert_eq!(cfg.onset.min_spacing_ms, 100.0);
        assert_eq!(cfg.onset.multiplier, 1.5);
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_config(Path::new("/nonexistent/melonset.toml")).is_none());
    }
}
