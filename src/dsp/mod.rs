pub mod fft;
pub mod mel;
pub mod onset;
pub mod segment;
pub mod spectrogram;
