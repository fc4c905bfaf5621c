//! Device seam between the playback core and an audio driver.
//!
//! The core only needs two things from a driver: per-parameter capability ranges and a
//! blocking period writer. [`crate::device::CpalBackend`] implements both on top of CPAL;
//! tests use the in-memory backend from `mock`.

use crate::config::PlaybackConfig;
use crate::error::PlayError;
use crate::params::{ParamKind, StreamParameters};

/// Inclusive range a device supports for one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityRange {
    pub kind: ParamKind,
    pub min: u32,
    pub max: u32,
}

impl CapabilityRange {
    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Read-only capability handle for one device. Dropping it releases the handle.
pub trait CapabilityQuery {
    /// Supported `[min, max]` for `kind`, or `DeviceQueryFailed`.
    fn range(&self, kind: ParamKind) -> Result<CapabilityRange, PlayError>;
}

/// Write-mode handle to an open device. Dropping it closes the device.
pub trait PcmWriter {
    /// Hand one period of interleaved PCM bytes to the device.
    ///
    /// Blocks until the device has room for it or the configured write timeout elapses;
    /// timeouts and driver errors are reported as `PlaybackWriteFailed`.
    fn write_period(&mut self, period: &[u8]) -> Result<(), PlayError>;

    /// Wait for frames already queued on the device to play out.
    fn drain(&mut self) -> Result<(), PlayError>;
}

/// An audio driver able to describe and open output devices.
pub trait PcmBackend {
    type Caps: CapabilityQuery;
    type Writer: PcmWriter;

    /// Open the capability handle of `card:device`.
    fn capabilities(&self, card: u32, device: u32) -> Result<Self::Caps, PlayError>;

    /// Open `params.card:params.device` for playback with exactly `params`.
    fn open(
        &self,
        params: &StreamParameters,
        config: &PlaybackConfig,
    ) -> Result<Self::Writer, PlayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_range_is_inclusive() {
        let range = CapabilityRange {
            kind: ParamKind::Rate,
            min: 8_000,
            max: 48_000,
        };
        assert!(range.contains(8_000));
        assert!(range.contains(48_000));
        assert!(!range.contains(7_999));
        assert!(!range.contains(48_001));
    }
}
