//! Stream parameters shared by the container parser, the capability validator and the
//! playback streamer.
//!
//! A [`StreamParameters`] value starts from command-line defaults, is overridden by the WAV
//! header (or raw-mode flags) and is then frozen for the lifetime of a playback session.

use thiserror::Error;

pub const DEFAULT_CARD: u32 = 0;
pub const DEFAULT_DEVICE: u32 = 0;
pub const DEFAULT_CHANNELS: u32 = 2;
pub const DEFAULT_RATE: u32 = 48_000;
pub const DEFAULT_BITS: u32 = 16;
pub const DEFAULT_PERIOD_SIZE: u32 = 1024;
pub const DEFAULT_PERIOD_COUNT: u32 = 2;

/// Sample widths the player can hand to a device.
pub const SUPPORTED_BITS: [u32; 4] = [8, 16, 24, 32];

/// Device parameter kinds checked before a device is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Rate,
    Channels,
    Bits,
    PeriodSize,
    PeriodCount,
}

impl ParamKind {
    /// Every kind, in the order diagnostics are reported.
    pub const ALL: [ParamKind; 5] = [
        ParamKind::Rate,
        ParamKind::Channels,
        ParamKind::Bits,
        ParamKind::PeriodSize,
        ParamKind::PeriodCount,
    ];

    /// Human-readable name used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            ParamKind::Rate => "Sample rate",
            ParamKind::Channels => "Channels",
            ParamKind::Bits => "Bits",
            ParamKind::PeriodSize => "Period size",
            ParamKind::PeriodCount => "Period count",
        }
    }

    /// Unit suffix appended directly after values in diagnostics.
    pub fn unit(self) -> &'static str {
        match self {
            ParamKind::Rate => "Hz",
            ParamKind::Channels => "",
            ParamKind::Bits => " bits",
            ParamKind::PeriodSize => " frames",
            ParamKind::PeriodCount => "",
        }
    }
}

/// Invariant violations on a [`StreamParameters`] value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("channel count must be at least 1")]
    NoChannels,
    #[error("{0} bits per sample is not supported (expected 8, 16, 24 or 32)")]
    UnsupportedBits(u32),
    #[error("sample rate must be greater than 0")]
    ZeroRate,
    #[error("period size must be at least 1 frame")]
    EmptyPeriod,
    #[error("period count must be at least 2, got {0}")]
    TooFewPeriods(u32),
}

/// Everything needed to address a device and configure its period ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParameters {
    pub card: u32,
    pub device: u32,
    pub channels: u32,
    pub rate: u32,
    pub bits: u32,
    /// Frames per period.
    pub period_size: u32,
    /// Periods in the device ring buffer.
    pub period_count: u32,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            card: DEFAULT_CARD,
            device: DEFAULT_DEVICE,
            channels: DEFAULT_CHANNELS,
            rate: DEFAULT_RATE,
            bits: DEFAULT_BITS,
            period_size: DEFAULT_PERIOD_SIZE,
            period_count: DEFAULT_PERIOD_COUNT,
        }
    }
}

impl StreamParameters {
    /// Check the invariants every session relies on.
    pub fn check(&self) -> Result<(), ParamError> {
        if self.channels == 0 {
            return Err(ParamError::NoChannels);
        }
        if !SUPPORTED_BITS.contains(&self.bits) {
            return Err(ParamError::UnsupportedBits(self.bits));
        }
        if self.rate == 0 {
            return Err(ParamError::ZeroRate);
        }
        if self.period_size == 0 {
            return Err(ParamError::EmptyPeriod);
        }
        if self.period_count < 2 {
            return Err(ParamError::TooFewPeriods(self.period_count));
        }
        Ok(())
    }

    /// Requested value for a capability check.
    pub fn value(&self, kind: ParamKind) -> u32 {
        match kind {
            ParamKind::Rate => self.rate,
            ParamKind::Channels => self.channels,
            ParamKind::Bits => self.bits,
            ParamKind::PeriodSize => self.period_size,
            ParamKind::PeriodCount => self.period_count,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Bytes in one frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample().saturating_mul(self.channels as usize)
    }

    /// Bytes transferred to the device per write.
    pub fn period_bytes(&self) -> usize {
        self.frame_bytes().saturating_mul(self.period_size as usize)
    }
}
