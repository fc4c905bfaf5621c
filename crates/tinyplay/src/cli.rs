use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use pcm_player::params::{DEFAULT_CARD, DEFAULT_DEVICE, DEFAULT_PERIOD_COUNT, DEFAULT_PERIOD_SIZE};

const USAGE: &str = "tinyplay file.wav [-D card] [-d device] [-p period_size] [-n n_periods]
       tinyplay file.raw [-D card] [-d device] [-p period_size] [-n n_periods] \
[-c channels] [-r rate] [-b bits] -i raw
       tinyplay --list-devices";

/// How the input file is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputKind {
    /// RIFF/WAVE container; stream shape comes from the header
    Wav,
    /// Headerless PCM; stream shape comes from -c/-r/-b
    Raw,
}

#[derive(Parser, Debug)]
#[command(
    name = "tinyplay",
    version,
    about = "Play a WAV or raw PCM file on a sound card",
    override_usage = USAGE,
    args_override_self = true
)]
pub struct Args {
    /// WAV or raw PCM file to play
    #[arg(required_unless_present = "list_devices")]
    pub file: Option<PathBuf>,

    /// Sound card index
    #[arg(short = 'D', long = "card", default_value_t = DEFAULT_CARD)]
    pub card: u32,

    /// Device index within the card
    #[arg(short = 'd', long = "device", default_value_t = DEFAULT_DEVICE)]
    pub device: u32,

    /// Frames per period
    #[arg(short = 'p', long = "period-size", default_value_t = DEFAULT_PERIOD_SIZE)]
    pub period_size: u32,

    /// Number of periods in the device ring buffer
    #[arg(short = 'n', long = "periods", default_value_t = DEFAULT_PERIOD_COUNT)]
    pub period_count: u32,

    /// Channel count (raw input only)
    #[arg(short = 'c', long)]
    pub channels: Option<u32>,

    /// Sample rate in Hz (raw input only)
    #[arg(short = 'r', long)]
    pub rate: Option<u32>,

    /// Bits per sample (raw input only)
    #[arg(short = 'b', long)]
    pub bits: Option<u32>,

    /// Input kind
    #[arg(short = 'i', long = "input", value_enum, ignore_case = true, default_value_t = InputKind::Wav)]
    pub input: InputKind,

    /// List output devices as card:device and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Give up on a period write after this many milliseconds
    #[arg(long, default_value_t = 2000)]
    pub write_timeout_ms: u64,
}
