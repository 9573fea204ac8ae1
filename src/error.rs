use thiserror::Error;

/// Errors surfaced by the analysis core. The binary wraps these in `anyhow`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Requested range violates `0 <= start <= end <= duration`.
    #[error("invalid range: start={start}, end={end}, duration={duration}")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    /// Filterbank width does not match the spectrum length.
    #[error("dimension mismatch: filterbank expects {expected} bins, spectrum has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A triangular filter would have zero width, or the frequency range is unusable.
    #[error("degenerate filter {filter}: {reason}")]
    DegenerateFilter { filter: usize, reason: String },

    /// A NaN or infinite value appeared in the spectrogram.
    #[error("non-finite value at frame {frame}, band {band}")]
    NonFinite { frame: usize, band: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
