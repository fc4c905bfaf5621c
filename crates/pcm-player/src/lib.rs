//! Period-based PCM playback core: WAV container parsing, device capability validation
//! and an underrun-safe streamer that feeds a device one period at a time.

pub mod backend;
pub mod caps;
pub mod config;
pub mod device;
pub mod error;
pub mod params;
pub mod pcm;
pub mod playback;
pub mod status;
pub mod streamer;
pub mod wav;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::PlayError;
pub use params::StreamParameters;
