use crate::error::AnalysisError;

/// Decoded audio held in memory, one sample vector per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Result<&[f32], AnalysisError> {
        self.channels.get(index).map(Vec::as_slice).ok_or_else(|| {
            AnalysisError::InvalidConfig(format!(
                "channel {} requested from a {}-channel buffer",
                index,
                self.channels.len()
            ))
        })
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Copies the first channel between `start_sec` and `end_sec` into a new mono buffer.
    ///
    /// An out-of-order or out-of-bounds range is reported as `InvalidRange`;
    /// `self` is never touched either way.
    pub fn slice_mono(&self, start_sec: f64, end_sec: f64) -> Result<AudioBuffer, AnalysisError> {
        let duration = self.duration_secs();
        if !(start_sec >= 0.0 && start_sec <= end_sec && end_sec <= duration) {
            log::warn!(
                "Cannot slice {:.3}s-{:.3}s from a {:.3}s buffer",
                start_sec,
                end_sec,
                duration
            );
            return Err(AnalysisError::InvalidRange {
                start: start_sec,
                end: end_sec,
                duration,
            });
        }

        let source = self.channel(0)?;
        let sr = self.sample_rate as f64;
        let num_samples = ((end_sec - start_sec) * sr).floor() as usize;
        let offset = ((start_sec * sr).floor() as usize).min(source.len());
        let available = (source.len() - offset).min(num_samples);

        let mut samples = vec![0.0f32; num_samples];
        samples[..available].copy_from_slice(&source[offset..offset + available]);
        Ok(AudioBuffer::mono(samples, self.sample_rate))
    }
}
