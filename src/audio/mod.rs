pub mod buffer;
pub mod decode;
#[cfg(feature = "resample")]
pub mod resample;
