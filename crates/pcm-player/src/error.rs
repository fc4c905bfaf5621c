use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::caps::ParamViolation;

/// Failures surfaced by the player, one variant per reportable condition.
///
/// Every variant maps to exit status 1 at the program boundary; the variants exist so each
/// condition can be reported with its own context.
#[derive(Debug, Error)]
pub enum PlayError {
    #[error("{0}")]
    Usage(String),

    #[error("unable to open file '{}': {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(
        "truncated file: chunk '{chunk}' declares {declared} bytes but only {remaining} remain"
    )]
    TruncatedFile {
        chunk: String,
        declared: u64,
        remaining: u64,
    },

    #[error("unable to query PCM device {card}:{device}: {reason}")]
    DeviceQueryFailed {
        card: u32,
        device: u32,
        reason: String,
    },

    #[error("device cannot play this stream: {}", describe_violations(.0))]
    ParamsOutOfRange(Vec<ParamViolation>),

    #[error("unable to open PCM device {card}:{device}: {reason}")]
    DeviceOpenFailed {
        card: u32,
        device: u32,
        reason: String,
    },

    #[error("playback write failed: {0}")]
    PlaybackWriteFailed(String),

    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

fn describe_violations(violations: &[ParamViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
