use crate::audio::buffer::AudioBuffer;
use crate::config::{OnsetConfig, SpectrogramConfig};
use crate::dsp::mel::FilterbankCache;
use crate::dsp::spectrogram::{self, Spectrogram};
use crate::dsp::{onset, segment};
use crate::error::AnalysisError;

/// A loaded buffer plus whatever has been computed from it so far.
///
/// Callers keep the session between steps instead of relying on globals:
/// detect onsets once, then look up segments or build spectrograms from them.
pub struct Session {
    buffer: AudioBuffer,
    onsets: Option<Vec<f64>>,
    filterbanks: FilterbankCache,
}

impl Session {
    pub fn new(buffer: AudioBuffer) -> Self {
        Self {
            buffer,
            onsets: None,
            filterbanks: FilterbankCache::new(),
        }
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn detect_onsets(&mut self, config: &OnsetConfig) -> Result<&[f64], AnalysisError> {
        let onsets = onset::detect(&self.buffer, config)?;
        log::info!("Detected {} segments", onsets.len().saturating_sub(1));
        Ok(self.onsets.insert(onsets).as_slice())
    }

    pub fn find_segment(&self, position_ms: f64) -> Option<(f64, f64)> {
        match &self.onsets {
            Some(onsets) => segment::find_segment(onsets, position_ms),
            None => {
                log::warn!("No segmentation data; run onset detection first");
                None
            }
        }
    }

    pub fn segments(&self) -> Vec<(f64, f64)> {
        self.onsets
            .as_deref()
            .map(segment::segments)
            .unwrap_or_default()
    }

    pub fn spectrogram(
        &self,
        start_ms: f64,
        end_ms: f64,
        config: &SpectrogramConfig,
    ) -> Result<Spectrogram, AnalysisError> {
        spectrogram::generate(&self.buffer, start_ms, end_ms, config, &self.filterbanks)
    }

    /// Spectrogram of the `index`-th segment, or `None` if there is no such segment.
    pub fn segment_spectrogram(
        &self,
        index: usize,
        config: &SpectrogramConfig,
    ) -> Result<Option<Spectrogram>, AnalysisError> {
        match self.segments().get(index) {
            Some(&(start, end)) => self.spectrogram(start, end, config).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
impl Session {
    pub fn onsets(&self) -> Option<&[f64]> {
        self.onsets.as_deref()
    }
}
