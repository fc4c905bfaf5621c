//! In-memory backend for exercising the playback core without audio hardware.
//!
//! Records every period written and counts handle opens/releases so tests can assert that
//! nothing is leaked. Ranges and failures are injected with the builder methods.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{CapabilityQuery, CapabilityRange, PcmBackend, PcmWriter};
use crate::config::PlaybackConfig;
use crate::error::PlayError;
use crate::params::{ParamKind, StreamParameters};

/// Handle and call counters shared between a [`MockBackend`] and its handles.
#[derive(Debug, Default)]
pub struct MockCounters {
    caps_opened: AtomicUsize,
    caps_released: AtomicUsize,
    writers_opened: AtomicUsize,
    writers_closed: AtomicUsize,
    drains: AtomicUsize,
}

impl MockCounters {
    pub fn caps_opened(&self) -> usize {
        self.caps_opened.load(Ordering::SeqCst)
    }

    pub fn caps_released(&self) -> usize {
        self.caps_released.load(Ordering::SeqCst)
    }

    pub fn writers_opened(&self) -> usize {
        self.writers_opened.load(Ordering::SeqCst)
    }

    /// Writers opened and not yet dropped.
    pub fn open_writers(&self) -> usize {
        self.writers_opened() - self.writers_closed.load(Ordering::SeqCst)
    }

    pub fn drains(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
struct Faults {
    unreachable: bool,
    query: Option<ParamKind>,
    open: bool,
    write_after: Option<usize>,
    drain: bool,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

/// Configurable fake device.
#[derive(Clone, Debug)]
pub struct MockBackend {
    ranges: HashMap<ParamKind, (u32, u32)>,
    faults: Faults,
    counters: Arc<MockCounters>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    last_open: Arc<Mutex<Option<StreamParameters>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A device accepting any sane stream.
    pub fn new() -> Self {
        let ranges = HashMap::from([
            (ParamKind::Rate, (8_000, 192_000)),
            (ParamKind::Channels, (1, 8)),
            (ParamKind::Bits, (8, 32)),
            (ParamKind::PeriodSize, (1, 1 << 20)),
            (ParamKind::PeriodCount, (2, 64)),
        ]);
        Self {
            ranges,
            faults: Faults {
                unreachable: false,
                query: None,
                open: false,
                write_after: None,
                drain: false,
                cancel_after: None,
            },
            counters: Arc::new(MockCounters::default()),
            writes: Arc::new(Mutex::new(Vec::new())),
            last_open: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_range(mut self, kind: ParamKind, min: u32, max: u32) -> Self {
        self.ranges.insert(kind, (min, max));
        self
    }

    /// Capability handle cannot be opened at all.
    pub fn unreachable(mut self) -> Self {
        self.faults.unreachable = true;
        self
    }

    /// Querying `kind` fails after the handle is open.
    pub fn failing_query(mut self, kind: ParamKind) -> Self {
        self.faults.query = Some(kind);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.faults.open = true;
        self
    }

    /// Writes after the first `n` succeed fail with a timeout.
    pub fn failing_write_after(mut self, n: usize) -> Self {
        self.faults.write_after = Some(n);
        self
    }

    pub fn failing_drain(mut self) -> Self {
        self.faults.drain = true;
        self
    }

    /// Set `flag` while the `n`th write is in flight, as a signal arriving mid-write would.
    pub fn cancel_after_writes(mut self, n: usize, flag: Arc<AtomicBool>) -> Self {
        self.faults.cancel_after = Some((n, flag));
        self
    }

    pub fn counters(&self) -> &MockCounters {
        &self.counters
    }

    /// Every period written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Parameters of the most recent successful open.
    pub fn last_open(&self) -> Option<StreamParameters> {
        self.last_open.lock().ok().and_then(|p| *p)
    }
}

/// Capability handle of a [`MockBackend`].
#[derive(Debug)]
pub struct MockCaps {
    card: u32,
    device: u32,
    ranges: HashMap<ParamKind, (u32, u32)>,
    failing: Option<ParamKind>,
    counters: Arc<MockCounters>,
}

impl CapabilityQuery for MockCaps {
    fn range(&self, kind: ParamKind) -> Result<CapabilityRange, PlayError> {
        if self.failing == Some(kind) {
            return Err(PlayError::DeviceQueryFailed {
                card: self.card,
                device: self.device,
                reason: format!("{} query rejected", kind.label()),
            });
        }
        let (min, max) = self.ranges.get(&kind).copied().unwrap_or((0, u32::MAX));
        Ok(CapabilityRange { kind, min, max })
    }
}

impl Drop for MockCaps {
    fn drop(&mut self) {
        self.counters.caps_released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Writer of a [`MockBackend`].
#[derive(Debug)]
pub struct MockWriter {
    faults: Faults,
    counters: Arc<MockCounters>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    written: usize,
}

impl PcmWriter for MockWriter {
    fn write_period(&mut self, period: &[u8]) -> Result<(), PlayError> {
        if self.faults.write_after.is_some_and(|n| self.written >= n) {
            return Err(PlayError::PlaybackWriteFailed(
                "timed out waiting for device".to_string(),
            ));
        }
        if let Ok(mut w) = self.writes.lock() {
            w.push(period.to_vec());
        }
        self.written += 1;
        if let Some((n, flag)) = &self.faults.cancel_after {
            if self.written == *n {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PlayError> {
        self.counters.drains.fetch_add(1, Ordering::SeqCst);
        if self.faults.drain {
            return Err(PlayError::PlaybackWriteFailed("drain rejected".to_string()));
        }
        Ok(())
    }
}

impl Drop for MockWriter {
    fn drop(&mut self) {
        self.counters.writers_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl PcmBackend for MockBackend {
    type Caps = MockCaps;
    type Writer = MockWriter;

    fn capabilities(&self, card: u32, device: u32) -> Result<MockCaps, PlayError> {
        if self.faults.unreachable {
            return Err(PlayError::DeviceQueryFailed {
                card,
                device,
                reason: "no such device".to_string(),
            });
        }
        self.counters.caps_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockCaps {
            card,
            device,
            ranges: self.ranges.clone(),
            failing: self.faults.query,
            counters: self.counters.clone(),
        })
    }

    fn open(
        &self,
        params: &StreamParameters,
        _config: &PlaybackConfig,
    ) -> Result<MockWriter, PlayError> {
        if self.faults.open {
            return Err(PlayError::DeviceOpenFailed {
                card: params.card,
                device: params.device,
                reason: "device busy".to_string(),
            });
        }
        self.counters.writers_opened.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_open.lock() {
            *last = Some(*params);
        }
        Ok(MockWriter {
            faults: self.faults.clone(),
            counters: self.counters.clone(),
            writes: self.writes.clone(),
            written: 0,
        })
    }
}
