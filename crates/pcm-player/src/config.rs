use std::time::Duration;

/// Device tuning parameters for a playback session.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Longest a single period write may block before the session fails.
    pub write_timeout: Duration,
    /// Longest `drain` waits for queued frames before giving up.
    pub drain_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(2000),
            drain_timeout: Duration::from_millis(5000),
        }
    }
}
