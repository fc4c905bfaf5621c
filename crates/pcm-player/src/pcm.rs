//! Little-endian integer PCM helpers.
//!
//! WAV stores 8-bit samples unsigned (silence = 0x80) and wider samples as signed
//! little-endian integers. [`PcmSample`] turns one stored sample into a device sample of the
//! same width without going through floating point, so integer streams reach the device
//! bit for bit.

/// Byte value representing silence for the given sample width.
pub fn silence_byte(bits: u32) -> u8 {
    if bits == 8 { 0x80 } else { 0x00 }
}

/// Device sample type that can be built from one stored PCM sample.
///
/// `bytes` holds exactly one sample in file layout; its length is the file's sample width.
/// Integer types are only ever fed samples of their own width.
pub trait PcmSample: Sized {
    fn from_le_pcm(bytes: &[u8]) -> Self;
}

impl PcmSample for u8 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl PcmSample for i8 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        (bytes[0] ^ 0x80) as i8
    }
}

impl PcmSample for i16 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl PcmSample for u16 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        u16::from_le_bytes([bytes[0], bytes[1] ^ 0x80])
    }
}

impl PcmSample for cpal::I24 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        // Sign-extended 24-bit value, always within I24's range.
        cpal::I24::new_unchecked(i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8)
    }
}

impl PcmSample for i32 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl PcmSample for u32 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3] ^ 0x80])
    }
}

/// Float output is only selected for widths up to 24 bits, which `f32` holds exactly.
impl PcmSample for f32 {
    fn from_le_pcm(bytes: &[u8]) -> Self {
        sample_to_f32(bytes)
    }
}

/// Normalize one stored sample to `[-1.0, 1.0)`, picking the width from `bytes.len()`.
pub fn sample_to_f32(bytes: &[u8]) -> f32 {
    match *bytes {
        [b] => (f32::from(b) - 128.0) / 128.0,
        [b0, b1] => f32::from(i16::from_le_bytes([b0, b1])) / 32_768.0,
        [b0, b1, b2] => (i32::from_le_bytes([0, b0, b1, b2]) >> 8) as f32 / 8_388_608.0,
        [b0, b1, b2, b3] => i32::from_le_bytes([b0, b1, b2, b3]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}
