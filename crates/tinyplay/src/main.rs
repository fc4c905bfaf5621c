//! tinyplay: play a WAV or raw PCM file on a sound card.
//!
//! The file is parsed (WAV) or taken as-is (raw), the stream parameters are checked against
//! the device's capabilities, and the samples are written to the device one period at a time
//! until the data runs out or Ctrl-C is pressed.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{CommandFactory, Parser};
use pcm_player::PlayError;
use pcm_player::device::CpalBackend;
use pcm_player::status::EndReason;
use pcm_player::streamer::StreamOptions;
use tinyplay::cli::Args;
use tinyplay::config::PlayConfig;
use tinyplay::runtime;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tinyplay=info,pcm_player=info")
        }))
        .init();

    if args.list_devices {
        return match runtime::list_devices() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let Some(path) = args.file.clone() else {
        eprintln!("{}", Args::command().render_usage());
        return ExitCode::FAILURE;
    };
    let config = PlayConfig::from_args(&args, path);

    let cancel = Arc::new(AtomicBool::new(false));
    if let Err(e) = runtime::install_interrupt_handler(cancel.clone()) {
        tracing::warn!("interrupt handler not installed: {e:#}");
    }

    let opts = StreamOptions {
        cancel: Some(cancel),
        played_frames: None,
    };
    match runtime::run_play(&CpalBackend, &config, &opts) {
        Ok(summary) => {
            if summary.end == EndReason::Cancelled {
                tracing::info!(frames = summary.frames, "playback stopped by user");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            if matches!(e, PlayError::Usage(_)) {
                eprintln!("{}", Args::command().render_usage());
            }
            ExitCode::FAILURE
        }
    }
}
