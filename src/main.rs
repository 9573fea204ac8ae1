mod audio;
mod cli;
mod config;
mod dsp;
mod error;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

use audio::buffer::AudioBuffer;
use cli::{Cli, Command, OnsetArgs, SpectrogramArgs};
use config::{Config, OnsetConfig, SpectrogramConfig};
use session::Session;

#[derive(Serialize)]
struct SegmentFeatures {
    start_ms: f64,
    end_ms: f64,
    frames: usize,
    /// mel bands x spec_length, dB
    input: Vec<Vec<f32>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    match cli.command {
        Command::Segments { input, onset } => {
            let mut session = load_session(&input)?;
            let onset_cfg = apply_onset_args(cfg.onset, &onset);
            let onsets = session.detect_onsets(&onset_cfg)?;
            print_json(onsets, cli.pretty)
        }

        Command::FindSegment {
            input,
            position_ms,
            onset,
        } => {
            let mut session = load_session(&input)?;
            let onset_cfg = apply_onset_args(cfg.onset, &onset);
            session.detect_onsets(&onset_cfg)?;
            let found = session.find_segment(position_ms);
            if found.is_none() {
                log::warn!("No segment contains {:.1} ms", position_ms);
            }
            print_json(&found, cli.pretty)
        }

        Command::Spectrogram {
            input,
            start_ms,
            end_ms,
            segment,
            spectrogram,
        } => {
            let mut session = load_session(&input)?;
            let spec_cfg = apply_spectrogram_args(cfg.spectrogram, &spectrogram);
            let spec = match segment {
                Some(index) => {
                    session.detect_onsets(&cfg.onset)?;
                    session
                        .segment_spectrogram(index, &spec_cfg)?
                        .with_context(|| format!("No segment {}", index))?
                }
                None => {
                    let end_ms = end_ms.unwrap_or_else(|| session.buffer().duration_ms());
                    session
                        .spectrogram(start_ms, end_ms, &spec_cfg)
                        .with_context(|| {
                            format!("Spectrogram of {:.1}-{:.1} ms failed", start_ms, end_ms)
                        })?
                }
            };
            log::info!("Spectrogram: {} frames x {} bands", spec.len(), spec.mel_count());
            print_json(spec.frames(), cli.pretty)
        }

        Command::Features {
            input,
            onset,
            spectrogram,
            spec_length,
        } => {
            let buffer = audio::decode::decode_file(&input)?;
            let mut session = Session::new(buffer.clone());
            let onset_cfg = apply_onset_args(cfg.onset, &onset);
            session.detect_onsets(&onset_cfg)?;
            let segments = session.segments();

            let classify_session = Session::new(prepare_for_model(
                buffer,
                cfg.model_input.target_sample_rate,
            )?);
            // resampling can shave a few samples off the end
            let classify_end_ms = classify_session.buffer().duration_ms();
            let spec_cfg = apply_spectrogram_args(cfg.spectrogram, &spectrogram);
            let spec_length = spec_length.unwrap_or(cfg.model_input.spec_length);
            let floor_db = cfg.model_input.floor_db;

            let pb = ProgressBar::new(segments.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed}] {bar:40.cyan/blue} {pos}/{len} segments ({eta} left)")
                    .context("Invalid progress bar template")?
                    .progress_chars("=>-"),
            );

            let features = segments
                .par_iter()
                .map(|&(start_ms, end_ms)| -> Result<SegmentFeatures, error::AnalysisError> {
                    let spec = classify_session.spectrogram(
                        start_ms.min(classify_end_ms),
                        end_ms.min(classify_end_ms),
                        &spec_cfg,
                    )?;
                    pb.inc(1);
                    Ok(SegmentFeatures {
                        start_ms,
                        end_ms,
                        frames: spec.len(),
                        input: spec.to_model_input(spec_length, floor_db),
                    })
                })
                .collect::<Result<Vec<_>, error::AnalysisError>>()?;
            pb.finish_with_message("Features complete");

            print_json(&features, cli.pretty)
        }

        Command::Slice {
            input,
            start_sec,
            end_sec,
        } => {
            let buffer = audio::decode::decode_file(&input)?;
            match buffer.slice_mono(start_sec, end_sec) {
                Ok(slice) => {
                    log::info!(
                        "Sliced {} samples ({:.3}s)",
                        slice.len(),
                        slice.duration_secs()
                    );
                    let summary = serde_json::json!({
                        "samples": slice.len(),
                        "duration_secs": slice.duration_secs(),
                    });
                    print_json(&summary, cli.pretty)
                }
                // the source buffer is left as decoded; report and carry on
                Err(err) => {
                    print_json(&serde_json::json!({ "error": err.to_string() }), cli.pretty)
                }
            }
        }
    }
}

fn load_session(input: &std::path::Path) -> Result<Session> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let buffer = audio::decode::decode_file(input)?;
    Ok(Session::new(buffer))
}

#[cfg(feature = "resample")]
fn prepare_for_model(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    audio::resample::resample(&buffer, target_rate)
}

#[cfg(not(feature = "resample"))]
fn prepare_for_model(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate() != target_rate {
        log::warn!(
            "Keeping {}Hz audio; build with --features resample to convert to {}Hz",
            buffer.sample_rate(),
            target_rate
        );
    }
    Ok(buffer)
}

fn apply_onset_args(mut cfg: OnsetConfig, args: &OnsetArgs) -> OnsetConfig {
    if let Some(v) = args.min_spacing_ms {
        cfg.min_spacing_ms = v;
    }
    if let Some(v) = args.frame_size {
        cfg.frame_size = v;
    }
    if let Some(v) = args.channel {
        cfg.channel = v;
    }
    cfg
}

fn apply_spectrogram_args(
    mut cfg: SpectrogramConfig,
    args: &SpectrogramArgs,
) -> SpectrogramConfig {
    if let Some(v) = args.fft_size {
        cfg.fft_size = v;
    }
    if let Some(v) = args.hop_size {
        cfg.hop_size = v;
    }
    if let Some(v) = args.mel_count {
        cfg.mel_count = v;
    }
    if let Some(v) = args.window {
        cfg.window = v;
    }
    cfg
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
