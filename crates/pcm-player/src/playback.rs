//! Playback stage (CPAL output stream) behind a blocking period writer.
//!
//! [`CpalWriter`] turns CPAL's pull-style callback into the push-style `write_period` the
//! streamer expects:
//! - periods are sent as raw file bytes through a bounded channel sized to the period ring,
//!   so `write_period` blocks while the ring is full
//! - the callback decodes each stored sample straight into the device's sample type,
//!   refills from the channel without blocking and outputs silence on underrun
//! - driver errors reported to the error callback are latched and fail the next write

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};

use crate::backend::PcmWriter;
use crate::config::PlaybackConfig;
use crate::error::PlayError;
use crate::params::StreamParameters;
use crate::pcm::PcmSample;

const DRAIN_POLL: Duration = Duration::from_millis(5);

/// State shared between the writer and the output callback.
#[derive(Default)]
struct Shared {
    /// Bytes sent but not yet copied to the device.
    queued_bytes: AtomicUsize,
    underrun_events: AtomicU64,
    draining: AtomicBool,
    stream_error: Mutex<Option<String>>,
}

/// Write-mode handle to a CPAL output stream.
pub struct CpalWriter {
    stream: cpal::Stream,
    tx: Sender<Vec<u8>>,
    shared: Arc<Shared>,
    started: bool,
    period_duration: Duration,
    write_timeout: Duration,
    drain_timeout: Duration,
}

impl CpalWriter {
    /// Build the output stream for `params`. The stream starts on the first write.
    pub fn open(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        params: &StreamParameters,
        playback: &PlaybackConfig,
    ) -> Result<Self, String> {
        let ring = params.period_count.saturating_sub(1).max(1) as usize;
        let (tx, rx) = crossbeam_channel::bounded(ring);
        let shared = Arc::new(Shared::default());
        let feed = Feed {
            rx,
            shared: shared.clone(),
            sample_bytes: params.bytes_per_sample(),
        };
        let stream = build_output_stream(device, config, sample_format, feed)?;
        let period_duration = Duration::from_secs_f64(
            f64::from(params.period_size) / f64::from(params.rate.max(1)),
        );
        Ok(Self {
            stream,
            tx,
            shared,
            started: false,
            period_duration,
            write_timeout: playback.write_timeout,
            drain_timeout: playback.drain_timeout,
        })
    }

    fn check_stream_error(&self) -> Result<(), PlayError> {
        let latched = self
            .shared
            .stream_error
            .lock()
            .ok()
            .and_then(|e| e.clone());
        match latched {
            Some(msg) => Err(PlayError::PlaybackWriteFailed(msg)),
            None => Ok(()),
        }
    }

    fn start(&mut self) -> Result<(), PlayError> {
        if !self.started {
            self.stream
                .play()
                .map_err(|e| PlayError::PlaybackWriteFailed(format!("start stream: {e}")))?;
            self.started = true;
        }
        Ok(())
    }
}

impl PcmWriter for CpalWriter {
    fn write_period(&mut self, period: &[u8]) -> Result<(), PlayError> {
        self.check_stream_error()?;
        let len = period.len();
        self.shared.queued_bytes.fetch_add(len, Ordering::Relaxed);
        match self.tx.send_timeout(period.to_vec(), self.write_timeout) {
            Ok(()) => {}
            Err(e) => {
                self.shared.queued_bytes.fetch_sub(len, Ordering::Relaxed);
                let reason = match e {
                    SendTimeoutError::Timeout(_) => format!(
                        "device did not accept a period within {} ms",
                        self.write_timeout.as_millis()
                    ),
                    SendTimeoutError::Disconnected(_) => "output stream closed".to_string(),
                };
                return Err(PlayError::PlaybackWriteFailed(reason));
            }
        }
        self.start()
    }

    fn drain(&mut self) -> Result<(), PlayError> {
        self.shared.draining.store(true, Ordering::Relaxed);
        if self.shared.queued_bytes.load(Ordering::Relaxed) > 0 {
            self.start()?;
        }
        let deadline = Instant::now() + self.drain_timeout;
        loop {
            self.check_stream_error()?;
            let queued = self.shared.queued_bytes.load(Ordering::Relaxed);
            if queued == 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(PlayError::PlaybackWriteFailed(format!(
                    "drain timed out with {queued} bytes queued"
                )));
            }
            std::thread::sleep(DRAIN_POLL);
        }
        if self.started {
            // The last callback buffer is still in the device.
            std::thread::sleep(self.period_duration);
        }
        Ok(())
    }
}

impl Drop for CpalWriter {
    fn drop(&mut self) {
        if self.started {
            if let Err(e) = self.stream.pause() {
                tracing::debug!("stream pause on close failed: {e}");
            }
        }
        tracing::debug!(
            underrun_events = self.shared.underrun_events.load(Ordering::Relaxed),
            "output stream closed"
        );
    }
}

/// Receiving end of the period ring plus what the callback needs to decode it.
struct Feed {
    rx: Receiver<Vec<u8>>,
    shared: Arc<Shared>,
    /// Width of one stored sample in the file.
    sample_bytes: usize,
}

/// Build a CPAL output stream of the given sample format fed from `feed`.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    feed: Feed,
) -> Result<cpal::Stream, String> {
    match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, feed),
        cpal::SampleFormat::I24 => build_stream::<cpal::I24>(device, config, feed),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, feed),
        cpal::SampleFormat::U8 => build_stream::<u8>(device, config, feed),
        cpal::SampleFormat::I8 => build_stream::<i8>(device, config, feed),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, feed),
        cpal::SampleFormat::U32 => build_stream::<u32>(device, config, feed),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, feed),
        other => Err(format!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    feed: Feed,
) -> Result<cpal::Stream, String>
where
    T: cpal::SizedSample + PcmSample,
{
    let Feed {
        rx,
        shared,
        sample_bytes,
    } = feed;
    let mut state = CallbackState::new(sample_bytes);
    let shared_cb = shared.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if let Ok(mut slot) = shared.stream_error.lock() {
            slot.get_or_insert_with(|| err.to_string());
        }
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let consumed = state.fill(data, &rx);
                if consumed > 0 {
                    shared_cb.queued_bytes.fetch_sub(consumed, Ordering::Relaxed);
                }
                if consumed < data.len() * state.sample_bytes
                    && !shared_cb.draining.load(Ordering::Relaxed)
                {
                    shared_cb.underrun_events.fetch_add(1, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| format!("build output stream: {e}"))
}

/// Local buffer owned by the output callback.
struct CallbackState {
    pos: usize,
    src: Vec<u8>,
    sample_bytes: usize,
}

impl CallbackState {
    fn new(sample_bytes: usize) -> Self {
        Self {
            pos: 0,
            src: Vec::new(),
            sample_bytes: sample_bytes.max(1),
        }
    }

    /// Copy queued samples into `data`, padding with silence when the queue runs dry.
    ///
    /// Returns the number of queued bytes consumed.
    fn fill<T>(&mut self, data: &mut [T], rx: &Receiver<Vec<u8>>) -> usize
    where
        T: cpal::Sample + PcmSample,
    {
        let width = self.sample_bytes;
        let mut consumed = 0;
        for slot in data.iter_mut() {
            if self.pos + width > self.src.len() {
                match rx.try_recv() {
                    Ok(next) => {
                        self.src = next;
                        self.pos = 0;
                    }
                    Err(_) => {
                        *slot = T::EQUILIBRIUM;
                        continue;
                    }
                }
                if self.src.len() < width {
                    *slot = T::EQUILIBRIUM;
                    continue;
                }
            }
            *slot = T::from_le_pcm(&self.src[self.pos..self.pos + width]);
            self.pos += width;
            consumed += width;
        }
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_copies_queued_periods_in_order() {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(2);
        tx.send([100i16, -100].iter().flat_map(|s| s.to_le_bytes()).collect())
            .unwrap();
        tx.send(7i16.to_le_bytes().to_vec()).unwrap();
        let mut state = CallbackState::new(2);
        let mut out = [0i16; 3];
        assert_eq!(state.fill(&mut out, &rx), 6);
        assert_eq!(out, [100, -100, 7]);
    }

    #[test]
    fn fill_keeps_32_bit_samples_exact() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let word = 0x1234_5671i32;
        tx.send(word.to_le_bytes().to_vec()).unwrap();
        let mut state = CallbackState::new(4);
        let mut out = [0i32; 1];
        assert_eq!(state.fill(&mut out, &rx), 4);
        assert_eq!(out[0], word);
    }

    #[test]
    fn fill_decodes_packed_24_bit() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(vec![0x56, 0x34, 0x12, 0xff, 0xff, 0xff]).unwrap();
        let mut state = CallbackState::new(3);
        let mut out = [cpal::I24::new_unchecked(0); 2];
        assert_eq!(state.fill(&mut out, &rx), 6);
        assert_eq!(out[0].inner(), 0x12_3456);
        assert_eq!(out[1].inner(), -1);
    }

    #[test]
    fn fill_outputs_silence_on_underrun() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(vec![0x10]).unwrap();
        let mut state = CallbackState::new(1);
        let mut out = [7u8; 4];
        assert_eq!(state.fill(&mut out, &rx), 1);
        assert_eq!(out, [0x10, 0x80, 0x80, 0x80]);
    }

    #[test]
    fn fill_keeps_partial_period_for_next_callback() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(vec![1, 0, 2, 0, 3, 0]).unwrap();
        let mut state = CallbackState::new(2);
        let mut first = [0i16; 2];
        let mut second = [0i16; 2];
        assert_eq!(state.fill(&mut first, &rx), 4);
        assert_eq!(state.fill(&mut second, &rx), 2);
        assert_eq!(first, [1, 2]);
        assert_eq!(second, [3, 0]);
    }

    #[test]
    fn fill_feeds_float_output_from_integer_periods() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(16_384i16.to_le_bytes().to_vec()).unwrap();
        let mut state = CallbackState::new(2);
        let mut out = [1.0f32; 2];
        assert_eq!(state.fill(&mut out, &rx), 2);
        assert_eq!(out, [0.5, 0.0]);
    }
}
