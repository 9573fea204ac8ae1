use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::dsp::fft::WindowFunction;

#[derive(Parser, Debug)]
#[command(
    name = "melonset",
    about = "Onset segmentation and log-mel spectrograms for drum samples"
)]
pub struct Cli {
    /// Config file (defaults to melonset.toml or the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect onsets and print them in milliseconds
    Segments {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        #[command(flatten)]
        onset: OnsetArgs,
    },

    /// Print the segment that contains a position
    FindSegment {
        input: PathBuf,

        /// Position in milliseconds
        position_ms: f64,

        #[command(flatten)]
        onset: OnsetArgs,
    },

    /// Print the normalized log-mel spectrogram of a time range
    Spectrogram {
        input: PathBuf,

        #[arg(long, default_value_t = 0.0)]
        start_ms: f64,

        /// End of the range; the whole file when omitted
        #[arg(long)]
        end_ms: Option<f64>,

        /// Use the n-th detected segment instead of --start-ms/--end-ms
        #[arg(long, conflicts_with_all = ["start_ms", "end_ms"])]
        segment: Option<usize>,

        #[command(flatten)]
        spectrogram: SpectrogramArgs,
    },

    /// Build fixed-size model inputs for every detected segment
    Features {
        input: PathBuf,

        #[command(flatten)]
        onset: OnsetArgs,

        #[command(flatten)]
        spectrogram: SpectrogramArgs,

        /// Frames per model input
        #[arg(long)]
        spec_length: Option<usize>,
    },

    /// Cut a mono slice out of the first channel and report its length
    Slice {
        input: PathBuf,
        start_sec: f64,
        end_sec: f64,
    },
}

#[derive(Args, Debug, Default)]
pub struct OnsetArgs {
    /// Minimum spacing between onsets in milliseconds
    #[arg(long)]
    pub min_spacing_ms: Option<f64>,

    /// Samples per onset analysis frame (power of two)
    #[arg(long)]
    pub frame_size: Option<usize>,

    /// Channel to analyze
    #[arg(long)]
    pub channel: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct SpectrogramArgs {
    #[arg(long)]
    pub fft_size: Option<usize>,

    #[arg(long)]
    pub hop_size: Option<usize>,

    #[arg(long)]
    pub mel_count: Option<usize>,

    /// Window applied before each FFT
    #[arg(long, value_enum)]
    pub window: Option<WindowFunction>,
}
