//! SDI-12 CRC codec
//!
//! The protocol uses CRC-16/ARC (reflected polynomial `0xA001`, seed `0`). Textual responses carry
//! it as three printable characters placed right before `<CR><LF>`, binary high-volume packets
//! carry it as two little-endian bytes.
use ::crc::{Crc, Digest, CRC_16_ARC};
use heapless::Vec;

use crate::error::Error;

static SDI12_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Bytes written by [`append`] after the data: three CRC characters, CR and LF
pub const APPENDED_LEN: usize = 5;

pub fn crc16(data: &[u8]) -> u16 {
    SDI12_CRC.checksum(data)
}

/// Splits `crc` in 4 + 6 + 6 bits and sets bit 6 on every group so that all three characters
/// land in `0x40..=0x7F`.
pub fn encode_ascii(crc: u16) -> [u8; 3] {
    [
        0x40 | (crc >> 12) as u8,
        0x40 | ((crc >> 6) & 0x3F) as u8,
        0x40 | (crc & 0x3F) as u8,
    ]
}

pub fn decode_ascii(encoded: [u8; 3]) -> u16 {
    (u16::from(encoded[0] & 0x0F) << 12)
        | (u16::from(encoded[1] & 0x3F) << 6)
        | u16::from(encoded[2] & 0x3F)
}

/// Little-endian CRC trailer of a binary packet
pub fn encode_binary(crc: u16) -> [u8; 2] {
    crc.to_le_bytes()
}

/// Computes the CRC over `buf[..data_len]` and writes the encoded CRC plus `<CR><LF>` at
/// `data_len`, replacing whatever followed the data (typically an existing `<CR><LF>`).
///
/// Fails with [`Error::BufferOverflow`] without touching `buf` when the result would not fit.
pub fn append<const N: usize>(buf: &mut Vec<u8, N>, data_len: usize) -> Result<(), Error> {
    if data_len > buf.len() || data_len + APPENDED_LEN > N {
        return Err(Error::BufferOverflow);
    }
    let encoded = encode_ascii(crc16(&buf[..data_len]));
    buf.truncate(data_len);
    buf.extend_from_slice(&encoded)
        .map_err(|_| Error::BufferOverflow)?;
    buf.extend_from_slice(b"\r\n")
        .map_err(|_| Error::BufferOverflow)?;
    Ok(())
}

/// Checks the CRC triplet of a textual response, with or without its trailing `<CR><LF>`.
///
/// Inputs shorter than 6 bytes are never valid.
pub fn verify(buf: &[u8]) -> bool {
    if buf.len() < 6 {
        return false;
    }
    let mut end = buf.len();
    if buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    if end < 3 {
        return false;
    }
    let (data, received) = buf[..end].split_at(end - 3);
    encode_ascii(crc16(data)) == received
}

/// Incremental CRC used to check binary packets piece by piece as they arrive
pub struct Crc16Digest(Digest<'static, u16>);

impl Crc16Digest {
    pub fn new() -> Self {
        Crc16Digest(SDI12_CRC.digest())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> u16 {
        self.0.finalize()
    }
}

impl Default for Crc16Digest {
    fn default() -> Self {
        Self::new()
    }
}
