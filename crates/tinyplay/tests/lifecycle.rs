use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use clap::Parser;
use hound::{WavSpec, WavWriter};
use pcm_player::PlayError;
use pcm_player::mock::MockBackend;
use pcm_player::params::ParamKind;
use pcm_player::status::EndReason;
use pcm_player::streamer::StreamOptions;
use pcm_player::wav::{FormatChunk, encode_header};
use tempfile::NamedTempFile;
use tinyplay::cli::Args;
use tinyplay::config::PlayConfig;
use tinyplay::runtime::run_play;

fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Integer PCM WAV file written by hound.
fn write_wav(channels: u16, sample_rate: u32, bits: u16, samples: &[i32]) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(file.path(), spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
    file
}

fn le16(samples: &[i32]) -> Vec<u8> {
    samples.iter().flat_map(|&s| (s as i16).to_le_bytes()).collect()
}

fn config_for(path: &std::path::Path, flags: &[&str]) -> PlayConfig {
    let mut argv = vec!["tinyplay".to_string(), path.display().to_string()];
    argv.extend(flags.iter().map(|s| s.to_string()));
    let args = Args::try_parse_from(argv).unwrap();
    PlayConfig::from_args(&args, path.to_path_buf())
}

#[test]
fn wav_file_streams_header_parameters() {
    let samples: Vec<i32> = (0..2048).map(|i| (i * 31 % 65_536) - 32_768).collect();
    let data = le16(&samples);
    let file = write_wav(2, 44_100, 16, &samples);
    let config = config_for(file.path(), &["-p", "256", "-n", "4"]);
    let backend = MockBackend::new();
    let played = Arc::new(AtomicU64::new(0));

    let summary = run_play(
        &backend,
        &config,
        &StreamOptions {
            cancel: None,
            played_frames: Some(played.clone()),
        },
    )
    .unwrap();

    let opened = backend.last_open().unwrap();
    assert_eq!((opened.channels, opened.rate, opened.bits), (2, 44_100, 16));
    assert_eq!((opened.period_size, opened.period_count), (256, 4));
    assert_eq!(summary.frames, 1024);
    assert_eq!(summary.periods, 4);
    assert_eq!(summary.end, EndReason::Exhausted);
    assert_eq!(played.load(Ordering::Relaxed), 1024);
    assert_eq!(backend.writes().concat(), data);
    assert_eq!(backend.counters().open_writers(), 0);
    assert_eq!(backend.counters().caps_released(), 1);
}

#[test]
fn packed_24_bit_samples_reach_the_device_unchanged() {
    let samples: Vec<i32> = (0..96).map(|i| (i - 48) * 174_000).collect();
    let data: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()[..3].to_vec()).collect();
    let file = write_wav(2, 48_000, 24, &samples);
    let config = config_for(file.path(), &["-p", "16"]);
    let backend = MockBackend::new();

    let summary = run_play(&backend, &config, &StreamOptions::default()).unwrap();

    let opened = backend.last_open().unwrap();
    assert_eq!((opened.channels, opened.bits), (2, 24));
    assert_eq!(summary.frames, 48);
    assert_eq!(summary.periods, 3);
    assert_eq!(backend.writes().concat(), data);
}

#[test]
fn raw_input_treats_whole_file_as_samples() {
    let data: Vec<u8> = (0..1000u32).map(|i| (i * 3 % 256) as u8).collect();
    let file = write_temp(&data);
    let config = config_for(
        file.path(),
        &["-i", "raw", "-c", "1", "-r", "8000", "-b", "8", "-p", "300"],
    );
    let backend = MockBackend::new();

    let summary = run_play(&backend, &config, &StreamOptions::default()).unwrap();

    let opened = backend.last_open().unwrap();
    assert_eq!((opened.channels, opened.rate, opened.bits), (1, 8_000, 8));
    assert_eq!(summary.frames, 1000);
    assert_eq!(summary.periods, 4);
    let written = backend.writes().concat();
    assert_eq!(&written[..1000], &data[..]);
    assert!(written[1000..].iter().all(|&b| b == 0x80));
}

#[test]
fn raw_header_bytes_are_not_parsed() {
    let file = write_wav(2, 44_100, 16, &[0; 8]);
    let config = config_for(file.path(), &["-i", "raw", "-c", "1", "-b", "8", "-p", "60"]);
    let backend = MockBackend::new();

    run_play(&backend, &config, &StreamOptions::default()).unwrap();

    assert_eq!(&backend.writes()[0][..4], b"RIFF");
    assert_eq!(backend.last_open().unwrap().rate, 48_000);
}

#[test]
fn out_of_range_rate_is_rejected_before_open() {
    let file = write_temp(&[0u8; 64]);
    let config = config_for(file.path(), &["-i", "raw", "-r", "192000"]);
    let backend = MockBackend::new().with_range(ParamKind::Rate, 8_000, 48_000);

    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, PlayError::ParamsOutOfRange(_)), "{err:?}");
    assert!(msg.contains("Sample rate"), "{msg}");
    assert!(msg.contains("192000"), "{msg}");
    assert!(msg.contains("48000"), "{msg}");
    assert_eq!(backend.counters().writers_opened(), 0);
    assert_eq!(backend.counters().caps_released(), 1);
}

#[test]
fn missing_file_is_reported_with_path() {
    let path = PathBuf::from("/nonexistent/tinyplay/clip.wav");
    let config = config_for(&path, &[]);
    let backend = MockBackend::new();

    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();

    assert!(matches!(err, PlayError::FileOpen { .. }), "{err:?}");
    assert!(err.to_string().contains("clip.wav"));
    assert_eq!(backend.counters().caps_opened(), 0);
}

#[test]
fn malformed_container_skips_device() {
    let file = write_temp(b"not a wave file at all");
    let config = config_for(file.path(), &[]);
    let backend = MockBackend::new();

    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();

    assert!(matches!(err, PlayError::MalformedContainer(_)), "{err:?}");
    assert_eq!(backend.counters().caps_opened(), 0);
    assert_eq!(backend.counters().writers_opened(), 0);
}

#[test]
fn odd_bit_depth_in_header_is_unsupported() {
    let fmt = FormatChunk::pcm(1, 8_000, 12);
    let mut bytes = encode_header(&fmt, 8);
    bytes.extend_from_slice(&[0u8; 8]);
    let file = write_temp(&bytes);
    let config = config_for(file.path(), &[]);

    let err = run_play(&MockBackend::new(), &config, &StreamOptions::default()).unwrap_err();

    assert!(matches!(err, PlayError::UnsupportedFormat(_)), "{err:?}");
}

#[test]
fn invalid_raw_flags_are_usage_errors() {
    let file = write_temp(&[0u8; 8]);
    let config = config_for(file.path(), &["-i", "raw", "-b", "12"]);
    let err = run_play(&MockBackend::new(), &config, &StreamOptions::default()).unwrap_err();
    assert!(matches!(err, PlayError::Usage(_)), "{err:?}");

    let config = config_for(file.path(), &["-n", "1"]);
    let err = run_play(&MockBackend::new(), &config, &StreamOptions::default()).unwrap_err();
    assert!(matches!(err, PlayError::Usage(_)), "{err:?}");
}

#[test]
fn raw_flags_are_checked_before_opening_the_file() {
    let path = PathBuf::from("/nonexistent/tinyplay/clip.raw");
    let config = config_for(&path, &["-i", "raw", "-b", "12"]);
    let backend = MockBackend::new();

    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();

    assert!(matches!(err, PlayError::Usage(_)), "{err:?}");
    assert_eq!(backend.counters().caps_opened(), 0);
}

#[test]
fn empty_data_chunk_completes_without_writes() {
    let file = write_wav(2, 48_000, 16, &[]);
    let config = config_for(file.path(), &[]);
    let backend = MockBackend::new();

    let summary = run_play(&backend, &config, &StreamOptions::default()).unwrap();

    assert_eq!(summary.frames, 0);
    assert!(backend.writes().is_empty());
    assert_eq!(backend.counters().open_writers(), 0);
}

#[test]
fn termination_request_stops_cleanly() {
    let file = write_wav(2, 48_000, 16, &[0; 32 * 1024]);
    let config = config_for(file.path(), &["-p", "64"]);
    let cancel = Arc::new(AtomicBool::new(false));
    let backend = MockBackend::new().cancel_after_writes(3, cancel.clone());

    let summary = run_play(
        &backend,
        &config,
        &StreamOptions {
            cancel: Some(cancel),
            played_frames: None,
        },
    )
    .unwrap();

    assert_eq!(summary.end, EndReason::Cancelled);
    assert_eq!(summary.periods, 3);
    assert_eq!(backend.counters().open_writers(), 0);
}

#[test]
fn device_failures_release_every_handle() {
    let file = write_wav(2, 48_000, 16, &[0; 512]);
    let config = config_for(file.path(), &["-p", "16"]);

    let backend = MockBackend::new().failing_open();
    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();
    assert!(matches!(err, PlayError::DeviceOpenFailed { .. }), "{err:?}");
    assert_eq!(backend.counters().caps_released(), backend.counters().caps_opened());

    let backend = MockBackend::new().failing_write_after(2);
    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();
    assert!(matches!(err, PlayError::PlaybackWriteFailed(_)), "{err:?}");
    assert_eq!(backend.writes().len(), 2);
    assert_eq!(backend.counters().open_writers(), 0);

    let backend = MockBackend::new().failing_query(ParamKind::PeriodSize);
    let err = run_play(&backend, &config, &StreamOptions::default()).unwrap_err();
    assert!(matches!(err, PlayError::DeviceQueryFailed { .. }), "{err:?}");
    assert_eq!(backend.counters().caps_released(), 1);
    assert_eq!(backend.counters().writers_opened(), 0);
}
