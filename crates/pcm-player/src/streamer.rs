//! Playback streamer: moves the data region to the device one period at a time.
//!
//! The loop runs on the calling thread. Each iteration checks the cancel flag, reads one
//! period from the input, zero-pads a short final period with silence and blocks in
//! [`PcmWriter::write_period`] until the device takes it. Cancellation is therefore observed
//! once per period and never interrupts a write in flight.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::backend::{PcmBackend, PcmWriter};
use crate::config::PlaybackConfig;
use crate::error::PlayError;
use crate::params::StreamParameters;
use crate::pcm::silence_byte;
use crate::status::{EndReason, PlaybackSummary, SessionState};

/// Optional hooks wired into a session.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    /// Cooperative termination flag, checked before every period read.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Incremented by the number of data frames after every successful write.
    pub played_frames: Option<Arc<AtomicU64>>,
}

/// An open device plus the counters of one playback run.
///
/// The session exclusively owns the writer; the device is closed when the writer is dropped,
/// which happens in [`PlaybackSession::close`] or when the session itself is dropped.
pub struct PlaybackSession<W: PcmWriter> {
    writer: Option<W>,
    params: StreamParameters,
    state: SessionState,
    frames: u64,
    periods: u64,
}

impl<W: PcmWriter> PlaybackSession<W> {
    /// Open the device described by `params`.
    pub fn open<B>(
        backend: &B,
        params: &StreamParameters,
        config: &PlaybackConfig,
    ) -> Result<Self, PlayError>
    where
        B: PcmBackend<Writer = W>,
    {
        tracing::debug!(state = %SessionState::Idle, "session created");
        match backend.open(params, config) {
            Ok(writer) => {
                tracing::debug!(
                    state = %SessionState::DeviceOpen,
                    card = params.card,
                    device = params.device,
                    "device opened"
                );
                Ok(Self {
                    writer: Some(writer),
                    params: *params,
                    state: SessionState::DeviceOpen,
                    frames: 0,
                    periods: 0,
                })
            }
            Err(e) => {
                tracing::debug!(state = %SessionState::Closed, "device open failed");
                Err(e)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames of input data written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Stream `data_len` bytes from `input`, drain the device and close it.
    ///
    /// A trailing partial frame is discarded. On a write failure the device is closed
    /// without draining and the error is returned.
    pub fn run<R: Read>(
        mut self,
        input: R,
        data_len: u64,
        opts: &StreamOptions,
    ) -> Result<PlaybackSummary, PlayError> {
        let frame_bytes = self.params.frame_bytes() as u64;
        let partial = data_len % frame_bytes;
        if partial != 0 {
            tracing::warn!(
                bytes = partial,
                frame_bytes,
                "data length is not a whole number of frames; discarding trailing partial frame"
            );
        }
        let mut reader = input.take(data_len - partial);

        self.transition(SessionState::Streaming);
        let end = match self.stream_periods(&mut reader, opts) {
            Ok(end) => end,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        self.transition(SessionState::Draining);
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.drain() {
                tracing::warn!("drain failed: {e}");
            }
        }
        self.close();

        let summary = PlaybackSummary {
            frames: self.frames,
            periods: self.periods,
            end,
        };
        tracing::info!(
            frames = summary.frames,
            periods = summary.periods,
            elapsed_ms = summary.elapsed_ms(self.params.rate),
            end = ?summary.end,
            "playback finished"
        );
        Ok(summary)
    }

    fn stream_periods<R: Read>(
        &mut self,
        reader: &mut R,
        opts: &StreamOptions,
    ) -> Result<EndReason, PlayError> {
        let period_bytes = self.params.period_bytes();
        let frame_bytes = self.params.frame_bytes();
        let silence = silence_byte(self.params.bits);
        let mut buf = Vec::new();
        buf.try_reserve_exact(period_bytes)
            .map_err(|e| PlayError::DeviceOpenFailed {
                card: self.params.card,
                device: self.params.device,
                reason: format!("cannot allocate a {period_bytes}-byte period buffer: {e}"),
            })?;
        buf.resize(period_bytes, 0);

        loop {
            if let Some(cancel) = &opts.cancel {
                if cancel.load(Ordering::Relaxed) {
                    tracing::info!(frames = self.frames, "termination requested");
                    return Ok(EndReason::Cancelled);
                }
            }

            let n = read_full(reader, &mut buf)?;
            if n == 0 {
                return Ok(EndReason::Exhausted);
            }
            let last = n < period_bytes;
            if last {
                tracing::debug!(
                    filled = n,
                    padded = period_bytes - n,
                    "padding final period with silence"
                );
                buf[n..].fill(silence);
            }

            let Some(writer) = self.writer.as_mut() else {
                return Err(PlayError::PlaybackWriteFailed("device is closed".to_string()));
            };
            writer.write_period(&buf)?;

            let frames = (n / frame_bytes) as u64;
            self.frames += frames;
            self.periods += 1;
            if let Some(counter) = &opts.played_frames {
                counter.fetch_add(frames, Ordering::Relaxed);
            }

            if last {
                return Ok(EndReason::Exhausted);
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }

    /// Release the device. Safe to call more than once.
    pub fn close(&mut self) {
        if self.writer.take().is_some() {
            self.transition(SessionState::Closed);
        }
    }
}

/// Open a session on `backend` and stream `data_len` bytes of `input` through it.
pub fn play<B, R>(
    backend: &B,
    params: &StreamParameters,
    config: &PlaybackConfig,
    input: R,
    data_len: u64,
    opts: &StreamOptions,
) -> Result<PlaybackSummary, PlayError>
where
    B: PcmBackend,
    R: Read,
{
    let session = PlaybackSession::open(backend, params, config)?;
    session.run(input, data_len, opts)
}

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, PlayError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(PlayError::Io(e)),
        }
    }
    Ok(filled)
}
