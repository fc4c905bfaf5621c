//! Playback lifecycle: open the input, resolve stream parameters, validate them against the
//! device and hand the data region to the streamer.
//!
//! Every resource is owned by exactly one scope here. The input file lives for the whole run
//! and is closed when `run_play` returns; the capability handle and the device writer are
//! owned and released inside `pcm_player`. A failure at any stage returns before later stages
//! acquire anything.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use pcm_player::backend::PcmBackend;
use pcm_player::params::StreamParameters;
use pcm_player::status::PlaybackSummary;
use pcm_player::streamer::{self, StreamOptions};
use pcm_player::wav::{self, DataRegion};
use pcm_player::{PlayError, caps, device};

use crate::cli::InputKind;
use crate::config::PlayConfig;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    device::list_devices()
}

/// Route Ctrl-C into the cooperative cancel flag.
pub fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received; stopping after the current period");
        cancel.store(true, Ordering::Relaxed);
    })?;
    Ok(())
}

/// Play one file on `backend` according to `config`.
///
/// Command-line values are checked before the file is opened.
pub fn run_play<B: PcmBackend>(
    backend: &B,
    config: &PlayConfig,
    opts: &StreamOptions,
) -> Result<PlaybackSummary, PlayError> {
    config
        .params
        .check()
        .map_err(|e| PlayError::Usage(e.to_string()))?;
    if config.input == InputKind::Raw {
        config
            .raw_params()
            .check()
            .map_err(|e| PlayError::Usage(e.to_string()))?;
    }

    let mut file = File::open(&config.path).map_err(|source| PlayError::FileOpen {
        path: config.path.clone(),
        source,
    })?;

    let (params, data) = resolve_stream(config, &mut file)?;

    caps::validate(backend, &params)?.into_result()?;

    file.seek(SeekFrom::Start(data.offset))?;
    tracing::info!(
        path = %config.path.display(),
        card = params.card,
        device = params.device,
        data_bytes = data.len,
        "Playing sample: {} ch, {} hz, {} bit",
        params.channels,
        params.rate,
        params.bits
    );

    streamer::play(backend, &params, &config.playback, &mut file, data.len, opts)
}

/// Work out the final stream parameters and where the samples are.
fn resolve_stream(
    config: &PlayConfig,
    file: &mut File,
) -> Result<(StreamParameters, DataRegion), PlayError> {
    match config.input {
        InputKind::Wav => {
            let layout = wav::parse(file)?;
            let params = layout.format.apply(config.params);
            params
                .check()
                .map_err(|e| PlayError::UnsupportedFormat(e.to_string()))?;
            if u32::from(layout.format.block_align) as usize != params.frame_bytes() {
                tracing::warn!(
                    block_align = layout.format.block_align,
                    frame_bytes = params.frame_bytes(),
                    "header block_align disagrees with channels and bits; using channels and bits"
                );
            }
            Ok((params, layout.data))
        }
        InputKind::Raw => {
            let params = config.raw_params();
            let len = file.metadata()?.len();
            Ok((params, DataRegion { offset: 0, len }))
        }
    }
}
