//! Playback session lifecycle state and the summary reported when a session ends.

use std::fmt;

/// Lifecycle of a [`crate::streamer::PlaybackSession`].
///
/// `Idle -> DeviceOpen -> Streaming -> Draining -> Closed`; a failed open or a failed write
/// jumps straight to `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    DeviceOpen,
    Streaming,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::DeviceOpen => "device-open",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why streaming stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The data region was fully transferred.
    Exhausted,
    /// Termination was requested.
    Cancelled,
}

/// Totals for a completed session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Frames of input data handed to the device (padding excluded).
    pub frames: u64,
    /// Period writes performed.
    pub periods: u64,
    pub end: EndReason,
}

impl PlaybackSummary {
    /// Playback time represented by `frames` at `rate`.
    pub fn elapsed_ms(&self, rate: u32) -> u64 {
        if rate == 0 {
            return 0;
        }
        self.frames.saturating_mul(1000) / u64::from(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_ms_handles_zero_rate() {
        let summary = PlaybackSummary {
            frames: 96_000,
            periods: 94,
            end: EndReason::Exhausted,
        };
        assert_eq!(summary.elapsed_ms(48_000), 2000);
        assert_eq!(summary.elapsed_ms(0), 0);
    }

    #[test]
    fn states_render_for_logs() {
        assert_eq!(SessionState::DeviceOpen.to_string(), "device-open");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
