//! Output device addressing and capability discovery on top of CPAL.
//!
//! Devices are addressed as `card:device`:
//! - `card` selects a CPAL host in `cpal::available_hosts()` order (ALSA first on Linux)
//! - `device` selects an output device of that host in enumeration order
//!
//! Capability ranges are folded over every supported output config the device reports.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};

use crate::backend::{CapabilityQuery, CapabilityRange, PcmBackend};
use crate::config::PlaybackConfig;
use crate::error::PlayError;
use crate::params::{ParamKind, StreamParameters};
use crate::playback::CpalWriter;

/// Deepest period ring the CPAL writer will allocate.
pub const MAX_PERIODS: u32 = 64;

/// Largest period offered when the host does not report a buffer size range.
pub const MAX_PERIOD_FRAMES: u32 = 1 << 16;

/// [`PcmBackend`] for real hardware through CPAL.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalBackend;

impl PcmBackend for CpalBackend {
    type Caps = CpalCaps;
    type Writer = CpalWriter;

    fn capabilities(&self, card: u32, device: u32) -> Result<CpalCaps, PlayError> {
        let fail = |reason: String| PlayError::DeviceQueryFailed {
            card,
            device,
            reason,
        };
        let dev = open_output_device(card, device).map_err(fail)?;
        let configs: Vec<cpal::SupportedStreamConfigRange> = dev
            .supported_output_configs()
            .map_err(|e| fail(e.to_string()))?
            .collect();
        Ok(CpalCaps {
            card,
            device,
            configs,
        })
    }

    fn open(
        &self,
        params: &StreamParameters,
        config: &PlaybackConfig,
    ) -> Result<CpalWriter, PlayError> {
        let fail = |reason: String| PlayError::DeviceOpenFailed {
            card: params.card,
            device: params.device,
            reason,
        };
        let device = open_output_device(params.card, params.device).map_err(fail)?;
        let ranges: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| fail(e.to_string()))?
            .collect();
        let supported = pick_stream_config(&ranges, params).ok_or_else(|| {
            fail(format!(
                "no output config for {} ch, {} Hz, {} bit",
                params.channels, params.rate, params.bits
            ))
        })?;

        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        stream_config.buffer_size = pick_buffer_size(supported.buffer_size(), params.period_size);
        tracing::info!(
            channels = stream_config.channels,
            rate_hz = params.rate,
            sample_format = ?supported.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "device output config"
        );

        CpalWriter::open(
            &device,
            &stream_config,
            supported.sample_format(),
            params,
            config,
        )
        .map_err(fail)
    }
}

/// Capability handle: the device's supported output configs, captured once.
pub struct CpalCaps {
    card: u32,
    device: u32,
    configs: Vec<cpal::SupportedStreamConfigRange>,
}

impl CapabilityQuery for CpalCaps {
    fn range(&self, kind: ParamKind) -> Result<CapabilityRange, PlayError> {
        let folded = match kind {
            ParamKind::Rate => fold_ranges(
                self.configs
                    .iter()
                    .map(|c| (c.min_sample_rate(), c.max_sample_rate())),
            ),
            ParamKind::Channels => fold_ranges(self.configs.iter().map(|c| {
                let ch = u32::from(c.channels());
                (ch, ch)
            })),
            ParamKind::Bits => {
                fold_ranges(self.configs.iter().filter_map(|c| format_bits(c.sample_format())))
            }
            ParamKind::PeriodSize => {
                fold_ranges(self.configs.iter().map(|c| buffer_range(c.buffer_size())))
            }
            ParamKind::PeriodCount => Some((2, MAX_PERIODS)),
        };
        let (min, max) = folded.ok_or_else(|| PlayError::DeviceQueryFailed {
            card: self.card,
            device: self.device,
            reason: "device reports no supported output configs".to_string(),
        })?;
        Ok(CapabilityRange { kind, min, max })
    }
}

/// Resolve `card:device` to a CPAL output device.
pub fn open_output_device(card: u32, device: u32) -> std::result::Result<cpal::Device, String> {
    let host = host_for_card(card)?;
    let mut devices = host
        .output_devices()
        .map_err(|e| format!("cannot enumerate output devices: {e}"))?;
    devices
        .nth(device as usize)
        .ok_or_else(|| format!("card {card} has no output device {device}"))
}

fn host_for_card(card: u32) -> std::result::Result<cpal::Host, String> {
    let hosts = cpal::available_hosts();
    let id = hosts
        .get(card as usize)
        .copied()
        .ok_or_else(|| format!("no sound card {card} ({} available)", hosts.len()))?;
    cpal::host_from_id(id).map_err(|e| format!("card {card} ({}) unavailable: {e}", id.name()))
}

/// Print every output device as `card:device name`.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices() -> Result<()> {
    for (card, id) in cpal::available_hosts().into_iter().enumerate() {
        let host = match cpal::host_from_id(id) {
            Ok(host) => host,
            Err(e) => {
                tracing::warn!(card, host = id.name(), "host unavailable: {e}");
                continue;
            }
        };
        let devices = host
            .output_devices()
            .with_context(|| format!("enumerate output devices of {}", id.name()))?;
        for (index, d) in devices.enumerate() {
            println!("{card}:{index} {} ({})", d.description()?, id.name());
        }
    }
    Ok(())
}

/// Choose the supported config that matches `params` exactly, preferring integer formats.
fn pick_stream_config(
    ranges: &[cpal::SupportedStreamConfigRange],
    params: &StreamParameters,
) -> Option<cpal::SupportedStreamConfig> {
    ranges
        .iter()
        .filter(|r| {
            config_matches(
                u32::from(r.channels()),
                r.min_sample_rate(),
                r.max_sample_rate(),
                r.sample_format(),
                params,
            )
        })
        .min_by_key(|r| sample_format_rank(r.sample_format()))
        .map(|r| r.clone().with_sample_rate(params.rate))
}

/// Use the period size as a fixed buffer when the config allows it.
fn pick_buffer_size(supported: &cpal::SupportedBufferSize, period_size: u32) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&period_size) => {
            cpal::BufferSize::Fixed(period_size)
        }
        cpal::SupportedBufferSize::Range { min, max } => {
            tracing::warn!(
                period_size,
                min = *min,
                max = *max,
                "period size outside this config's buffer range; using device default"
            );
            cpal::BufferSize::Default
        }
        cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Fixed(period_size),
    }
}

fn config_matches(
    channels: u32,
    min_rate: u32,
    max_rate: u32,
    format: cpal::SampleFormat,
    params: &StreamParameters,
) -> bool {
    channels == params.channels
        && (min_rate..=max_rate).contains(&params.rate)
        && format_bits(format).is_some_and(|(lo, hi)| (lo..=hi).contains(&params.bits))
}

/// PCM widths a sample format can carry without loss, as an inclusive range.
///
/// Integer formats carry exactly their own width. `F32` holds integers up to 24 bits
/// exactly. Formats the writer cannot feed report `None`.
fn format_bits(format: cpal::SampleFormat) -> Option<(u32, u32)> {
    match format {
        cpal::SampleFormat::U8
        | cpal::SampleFormat::I8
        | cpal::SampleFormat::I16
        | cpal::SampleFormat::U16
        | cpal::SampleFormat::I24
        | cpal::SampleFormat::I32
        | cpal::SampleFormat::U32 => {
            let bits = format.bits_per_sample();
            Some((bits, bits))
        }
        cpal::SampleFormat::F32 => Some((8, 24)),
        _ => None,
    }
}

fn buffer_range(size: &cpal::SupportedBufferSize) -> (u32, u32) {
    match size {
        cpal::SupportedBufferSize::Range { min, max } => (*min, *max),
        cpal::SupportedBufferSize::Unknown => (1, MAX_PERIOD_FRAMES),
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16
        | cpal::SampleFormat::I24
        | cpal::SampleFormat::I32
        | cpal::SampleFormat::U8 => 0,
        cpal::SampleFormat::I8 | cpal::SampleFormat::U16 | cpal::SampleFormat::U32 => 1,
        cpal::SampleFormat::F32 => 2,
        _ => 10,
    }
}

/// Union of `(min, max)` pairs, or `None` when there are none.
fn fold_ranges(ranges: impl Iterator<Item = (u32, u32)>) -> Option<(u32, u32)> {
    ranges.fold(None, |acc, (min, max)| match acc {
        None => Some((min, max)),
        Some((lo, hi)) => Some((lo.min(min), hi.max(max))),
    })
}
