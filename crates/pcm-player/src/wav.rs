//! RIFF/WAVE container parsing.
//!
//! The parser walks the chunk list of a WAVE file, reads the `fmt ` chunk and stops at the
//! `data` chunk, returning where the samples live. Sample bytes are never read here; the
//! streamer pulls them straight from the file afterwards.
//!
//! Unknown chunks (`LIST`, `fact`, `cue `, ...) are skipped by their declared size, honoring
//! the RIFF rule that odd-sized chunks are followed by one pad byte.
//!
//! `WAVE_FORMAT_EXTENSIBLE` headers are accepted when their sub-format GUID is integer PCM;
//! writers use them for widths above 16 bits and for more than two channels.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::error::PlayError;
use crate::params::StreamParameters;

/// `audio_format` value for uncompressed integer PCM.
pub const FORMAT_PCM: u16 = 1;
/// `audio_format` value announcing a `WAVE_FORMAT_EXTENSIBLE` extension.
pub const FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// `KSDATAFORMAT_SUBTYPE_PCM` as stored in the extension.
const PCM_SUBFORMAT: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const FORMAT_CHUNK_LEN: usize = 16;
/// cbSize, valid bits, channel mask and sub-format GUID.
const EXTENSION_LEN: usize = 24;

/// Leading 12 bytes of a RIFF/WAVE file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiffHeader {
    pub riff_tag: [u8; 4],
    pub riff_size: u32,
    pub wave_tag: [u8; 4],
}

impl RiffHeader {
    fn from_bytes(b: &[u8; RIFF_HEADER_LEN]) -> Self {
        Self {
            riff_tag: [b[0], b[1], b[2], b[3]],
            riff_size: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            wave_tag: [b[8], b[9], b[10], b[11]],
        }
    }

    pub fn is_wave(&self) -> bool {
        &self.riff_tag == b"RIFF" && &self.wave_tag == b"WAVE"
    }
}

/// Tag + length header preceding every sub-chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: [u8; 4],
    pub size: u32,
}

impl ChunkHeader {
    fn from_bytes(b: &[u8; CHUNK_HEADER_LEN]) -> Self {
        Self {
            id: [b[0], b[1], b[2], b[3]],
            size: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }

    fn id_lossy(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// Bytes occupied by the chunk body including the alignment pad byte.
    fn padded_size(&self) -> u64 {
        u64::from(self.size) + u64::from(self.size & 1)
    }
}

/// Body of the `fmt ` chunk (the 16-byte PCM prefix; extension bytes are skipped).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatChunk {
    pub audio_format: u16,
    pub num_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    /// Build a consistent PCM format description.
    ///
    /// Derived fields saturate when the shape does not fit the header's field widths.
    pub fn pcm(num_channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        let frame = u32::from(num_channels) * u32::from(bits_per_sample.div_ceil(8));
        let block_align = u16::try_from(frame).unwrap_or(u16::MAX);
        Self {
            audio_format: FORMAT_PCM,
            num_channels,
            sample_rate,
            byte_rate: sample_rate.saturating_mul(frame),
            block_align,
            bits_per_sample,
        }
    }

    fn from_bytes(b: &[u8; FORMAT_CHUNK_LEN]) -> Self {
        Self {
            audio_format: u16::from_le_bytes([b[0], b[1]]),
            num_channels: u16::from_le_bytes([b[2], b[3]]),
            sample_rate: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            byte_rate: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            block_align: u16::from_le_bytes([b[12], b[13]]),
            bits_per_sample: u16::from_le_bytes([b[14], b[15]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; FORMAT_CHUNK_LEN] {
        let mut out = [0u8; FORMAT_CHUNK_LEN];
        out[0..2].copy_from_slice(&self.audio_format.to_le_bytes());
        out[2..4].copy_from_slice(&self.num_channels.to_le_bytes());
        out[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[8..12].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[12..14].copy_from_slice(&self.block_align.to_le_bytes());
        out[14..16].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out
    }

    /// Override the stream-shape fields of `params` with the header's values.
    pub fn apply(&self, params: StreamParameters) -> StreamParameters {
        StreamParameters {
            channels: u32::from(self.num_channels),
            rate: self.sample_rate,
            bits: u32::from(self.bits_per_sample),
            ..params
        }
    }
}

/// Location of the sample bytes inside the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRegion {
    /// Absolute byte offset of the first sample.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

/// Result of a successful parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavLayout {
    pub riff: RiffHeader,
    pub format: FormatChunk,
    pub data: DataRegion,
}

/// Parse a RIFF/WAVE header starting at offset 0 of `reader`.
///
/// On success the reader is positioned at the first sample byte.
pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<WavLayout, PlayError> {
    let total = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut riff_bytes = [0u8; RIFF_HEADER_LEN];
    read_header_bytes(reader, &mut riff_bytes, "file is shorter than a RIFF header")?;
    let riff = RiffHeader::from_bytes(&riff_bytes);
    if !riff.is_wave() {
        return Err(PlayError::MalformedContainer(format!(
            "expected RIFF/WAVE magic, found '{}'/'{}'",
            String::from_utf8_lossy(&riff.riff_tag),
            String::from_utf8_lossy(&riff.wave_tag)
        )));
    }

    let mut format: Option<FormatChunk> = None;
    loop {
        let pos = reader.stream_position()?;
        if total.saturating_sub(pos) < CHUNK_HEADER_LEN as u64 {
            let missing = if format.is_none() { "fmt " } else { "data" };
            return Err(PlayError::MalformedContainer(format!(
                "no '{missing}' chunk found"
            )));
        }

        let mut header_bytes = [0u8; CHUNK_HEADER_LEN];
        reader.read_exact(&mut header_bytes)?;
        let chunk = ChunkHeader::from_bytes(&header_bytes);

        let remaining = total.saturating_sub(pos + CHUNK_HEADER_LEN as u64);
        if u64::from(chunk.size) > remaining {
            return Err(PlayError::TruncatedFile {
                chunk: chunk.id_lossy(),
                declared: u64::from(chunk.size),
                remaining,
            });
        }

        match &chunk.id {
            b"fmt " => {
                if (chunk.size as usize) < FORMAT_CHUNK_LEN {
                    return Err(PlayError::MalformedContainer(format!(
                        "'fmt ' chunk is {} bytes, expected at least {FORMAT_CHUNK_LEN}",
                        chunk.size
                    )));
                }
                let mut fmt_bytes = [0u8; FORMAT_CHUNK_LEN];
                reader.read_exact(&mut fmt_bytes)?;
                let fmt = FormatChunk::from_bytes(&fmt_bytes);
                let mut consumed = FORMAT_CHUNK_LEN as u64;
                match fmt.audio_format {
                    FORMAT_PCM => {}
                    FORMAT_EXTENSIBLE => {
                        read_pcm_extension(reader, chunk.size)?;
                        consumed += EXTENSION_LEN as u64;
                    }
                    other => {
                        return Err(PlayError::UnsupportedFormat(format!(
                            "audio format {other:#06x} is not uncompressed PCM"
                        )));
                    }
                }
                skip(reader, chunk.padded_size() - consumed)?;
                format = Some(fmt);
            }
            b"data" => {
                let Some(fmt) = format else {
                    return Err(PlayError::MalformedContainer(
                        "'data' chunk precedes 'fmt ' chunk".to_string(),
                    ));
                };
                let offset = reader.stream_position()?;
                tracing::debug!(offset, len = chunk.size, "found data chunk");
                return Ok(WavLayout {
                    riff,
                    format: fmt,
                    data: DataRegion {
                        offset,
                        len: u64::from(chunk.size),
                    },
                });
            }
            _ => {
                tracing::debug!(chunk = %chunk.id_lossy(), size = chunk.size, "skipping chunk");
                skip(reader, chunk.padded_size())?;
            }
        }
    }
}

/// Canonical 44-byte header for `format` followed by `data_len` sample bytes.
pub fn encode_header(format: &FormatChunk, data_len: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(RIFF_HEADER_LEN + 2 * CHUNK_HEADER_LEN + FORMAT_CHUNK_LEN);
    let riff_size = 4 + (CHUNK_HEADER_LEN + FORMAT_CHUNK_LEN + CHUNK_HEADER_LEN) as u32
        + data_len
        + (data_len & 1);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&(FORMAT_CHUNK_LEN as u32).to_le_bytes());
    out.extend_from_slice(&format.to_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out
}

/// Read the extensible part of a `fmt ` chunk and require an integer PCM sub-format.
fn read_pcm_extension<R: Read>(reader: &mut R, chunk_size: u32) -> Result<(), PlayError> {
    if (chunk_size as usize) < FORMAT_CHUNK_LEN + EXTENSION_LEN {
        return Err(PlayError::MalformedContainer(format!(
            "extensible 'fmt ' chunk is {chunk_size} bytes, expected at least {}",
            FORMAT_CHUNK_LEN + EXTENSION_LEN
        )));
    }
    let mut ext = [0u8; EXTENSION_LEN];
    reader.read_exact(&mut ext)?;
    let sub_format = &ext[8..];
    if sub_format != PCM_SUBFORMAT {
        return Err(PlayError::UnsupportedFormat(format!(
            "extensible sub-format {:#06x} is not uncompressed PCM",
            u16::from_le_bytes([sub_format[0], sub_format[1]])
        )));
    }
    Ok(())
}

fn read_header_bytes<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    short_msg: &str,
) -> Result<(), PlayError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => PlayError::MalformedContainer(short_msg.to_string()),
        _ => PlayError::Io(e),
    })
}

fn skip<R: Seek>(reader: &mut R, bytes: u64) -> Result<(), PlayError> {
    if bytes > 0 {
        reader.seek(SeekFrom::Current(bytes as i64))?;
    }
    Ok(())
}
