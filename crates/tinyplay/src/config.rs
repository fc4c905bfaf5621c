use std::path::PathBuf;
use std::time::Duration;

pub use pcm_player::config::PlaybackConfig;
use pcm_player::params::{DEFAULT_BITS, DEFAULT_CHANNELS, DEFAULT_RATE, StreamParameters};

use crate::cli::{Args, InputKind};

/// Stream shape supplied on the command line for raw input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawFormat {
    pub channels: Option<u32>,
    pub rate: Option<u32>,
    pub bits: Option<u32>,
}

impl RawFormat {
    fn is_empty(&self) -> bool {
        self.channels.is_none() && self.rate.is_none() && self.bits.is_none()
    }
}

/// Everything one playback run needs, resolved from the command line.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub input: InputKind,
    /// Device address and period ring; stream shape fields hold defaults until resolved.
    pub params: StreamParameters,
    pub raw: RawFormat,
    pub playback: PlaybackConfig,
}

impl PlayConfig {
    pub fn from_args(args: &Args, path: PathBuf) -> Self {
        let raw = RawFormat {
            channels: args.channels,
            rate: args.rate,
            bits: args.bits,
        };
        if args.input == InputKind::Wav && !raw.is_empty() {
            tracing::warn!("-c/-r/-b only apply to raw input; using the WAV header instead");
        }
        Self {
            path,
            input: args.input,
            params: StreamParameters {
                card: args.card,
                device: args.device,
                period_size: args.period_size,
                period_count: args.period_count,
                ..StreamParameters::default()
            },
            raw,
            playback: PlaybackConfig {
                write_timeout: Duration::from_millis(args.write_timeout_ms),
                ..PlaybackConfig::default()
            },
        }
    }

    /// Parameters for raw input: command-line shape over the fixed defaults.
    pub fn raw_params(&self) -> StreamParameters {
        StreamParameters {
            channels: self.raw.channels.unwrap_or(DEFAULT_CHANNELS),
            rate: self.raw.rate.unwrap_or(DEFAULT_RATE),
            bits: self.raw.bits.unwrap_or(DEFAULT_BITS),
            ..self.params
        }
    }
}
