//! Response decoders
//!
//! Pure functions over received bytes, usable without a bus, e.g. to analyse captured logs.
//! Text inputs may still carry their trailing `<CR><LF>`.
use heapless::Vec;
use log::debug;

use crate::address::address_from_byte;
use crate::crc;
use crate::error::Error;
use crate::types::{
    clip, BinaryPacket, BinaryType, DataResponse, IdentifyResponse, Identification,
    MeasurementKind, MeasurementResponse, ParamMetaResponse,
};
use crate::value::{parse_all, Value};
use crate::{
    BIN_MAX_PAYLOAD, BIN_PACKET_OVERHEAD, FIRMWARE_VERSION_LEN, MODEL_LEN, VENDOR_LEN,
};

/// Identification responses carry at least address, version, vendor, model and firmware
pub const IDENTIFY_MIN_LEN: usize = 1 + 2 + VENDOR_LEN + MODEL_LEN + FIRMWARE_VERSION_LEN;

pub fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\r' || line[end - 1] == b'\n') {
        end -= 1;
    }
    &line[..end]
}

fn response_address(line: &[u8]) -> Result<char, Error> {
    line.first()
        .copied()
        .and_then(address_from_byte)
        .ok_or(Error::ParseFailed)
}

/// Exactly `width` ASCII digits
fn digits(field: &[u8], width: usize) -> Result<u16, Error> {
    if field.len() < width || !field[..width].iter().all(u8::is_ascii_digit) {
        return Err(Error::ParseFailed);
    }
    Ok(field[..width]
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0')))
}

fn text(field: &[u8]) -> Result<&str, Error> {
    core::str::from_utf8(field).map_err(|_| Error::ParseFailed)
}

/// Decodes `atttn`, `atttnn` or `atttnnn` depending on `kind`.
///
/// The line must have exactly the width of `kind`, so a count of the wrong family is rejected
/// instead of being cut short.
pub fn parse_measurement_response(
    line: &[u8],
    kind: MeasurementKind,
) -> Result<MeasurementResponse, Error> {
    let line = trim_crlf(line);
    let width = kind.count_digits();
    if line.len() != 4 + width {
        debug!(
            "measurement response has {} bytes, expected {}",
            line.len(),
            4 + width
        );
        return Err(Error::ParseFailed);
    }
    Ok(MeasurementResponse {
        address: response_address(line)?,
        wait_seconds: digits(&line[1..], 3)?,
        value_count: digits(&line[4..], width)?,
        kind,
    })
}

/// Values of the value section, see [`crate::value::parse_all`]
pub fn parse_data_values<const N: usize>(text: &[u8], crc: bool) -> Vec<Value, N> {
    parse_all(text, crc)
}

/// Decodes an `aD`/`aR` response. With `crc` set the CRC is verified first.
pub fn parse_data_response(line: &[u8], crc: bool) -> Result<DataResponse, Error> {
    if crc && !crc::verify(line) {
        debug!("data response CRC mismatch");
        return Err(Error::CrcMismatch);
    }
    let line = trim_crlf(line);
    Ok(DataResponse {
        address: response_address(line)?,
        values: parse_all(&line[1..], crc),
    })
}

/// Fixed-offset decode of `a14VENDOR  MODEL1FWVSERIAL`. Padding spaces are trimmed.
pub fn parse_identification(line: &[u8]) -> Result<IdentifyResponse, Error> {
    let line = trim_crlf(line);
    if line.len() < IDENTIFY_MIN_LEN {
        debug!("identification too short: {} bytes", line.len());
        return Err(Error::ParseFailed);
    }
    let address = response_address(line)?;
    let version = text(&line[1..3])?;
    let mut pos = 3;
    let vendor = text(&line[pos..pos + VENDOR_LEN])?;
    pos += VENDOR_LEN;
    let model = text(&line[pos..pos + MODEL_LEN])?;
    pos += MODEL_LEN;
    let firmware = text(&line[pos..pos + FIRMWARE_VERSION_LEN])?;
    pos += FIRMWARE_VERSION_LEN;
    let serial = text(&line[pos..])?;

    Ok(IdentifyResponse {
        address,
        sdi12_version: clip(version),
        info: Identification::new(
            vendor.trim_end(),
            model.trim_end(),
            firmware.trim_end(),
            serial.trim_end(),
        ),
    })
}

/// Decodes `a,SHEF,units;` with an optional CRC after the `;`.
///
/// An address-only answer means the sensor has no such parameter and yields
/// [`Error::NoData`].
pub fn parse_param_meta(line: &[u8]) -> Result<ParamMetaResponse, Error> {
    let trimmed = trim_crlf(line);
    let address = response_address(trimmed)?;
    if trimmed.len() == 1 || (trimmed.len() == 4 && crc::verify(line)) {
        return Err(Error::NoData);
    }
    // shortest form is "a,X,;"
    if trimmed.len() < 5 || trimmed[1] != b',' {
        return Err(Error::ParseFailed);
    }
    let body = &trimmed[2..];
    let comma = body
        .iter()
        .position(|b| *b == b',')
        .ok_or(Error::ParseFailed)?;
    let semicolon = body
        .iter()
        .position(|b| *b == b';')
        .ok_or(Error::ParseFailed)?;
    if semicolon < comma || comma == 0 {
        return Err(Error::ParseFailed);
    }
    let trailer = &body[semicolon + 1..];
    if !trailer.is_empty() && !(trailer.len() == 3 && crc::verify(line)) {
        debug!("parameter metadata CRC mismatch");
        return Err(Error::CrcMismatch);
    }

    Ok(ParamMetaResponse {
        address,
        shef: clip(text(&body[..comma])?),
        units: clip(text(&body[comma + 1..semicolon])?),
    })
}

/// Decodes a complete binary packet and checks its CRC
pub fn parse_binary_packet(packet: &[u8]) -> Result<BinaryPacket, Error> {
    if packet.len() < BIN_PACKET_OVERHEAD {
        return Err(Error::ParseFailed);
    }
    let size = usize::from(u16::from_le_bytes([packet[1], packet[2]]));
    if size > BIN_MAX_PAYLOAD {
        return Err(Error::BufferOverflow);
    }
    if packet.len() != BIN_PACKET_OVERHEAD + size {
        return Err(Error::ParseFailed);
    }
    let (body, received) = packet.split_at(4 + size);
    if crc::encode_binary(crc::crc16(body)) != received {
        debug!("binary packet CRC mismatch");
        return Err(Error::CrcMismatch);
    }
    Ok(BinaryPacket {
        address: response_address(packet)?,
        data_type: BinaryType::try_from(packet[3])?,
        payload: Vec::from_slice(&body[4..]).map_err(|_| Error::BufferOverflow)?,
    })
}
