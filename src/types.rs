//! Types shared by the sensor and the master side of the protocol
use heapless::{String, Vec};

use crate::value::Value;
use crate::{
    BIN_MAX_PAYLOAD, FIRMWARE_VERSION_LEN, MAX_VALUES_C, MAX_VALUES_CHARS_C, MAX_VALUES_CHARS_M,
    MAX_VALUES_H, MAX_VALUES_M, MODEL_LEN, SERIAL_MAX_LEN, VENDOR_LEN,
};

/// Most values one `aD`/`aR` response can carry
pub const MAX_VALUES_PER_RESPONSE: usize = MAX_VALUES_C as usize;

/// Bus direction requested from the hardware collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Measurement families, each with its own command letters and response widths
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasurementKind {
    /// `aM!`, `aM1!`..`aM9!`, `aMC!`
    Standard,
    /// `aC!`, `aC1!`..`aC9!`, `aCC!`
    Concurrent,
    /// `aHA!`
    HighVolumeAscii,
    /// `aHB!`
    HighVolumeBinary,
    /// `aV!`
    Verification,
    /// `aR0!`..`aR9!`
    Continuous,
}

impl MeasurementKind {
    /// Digits of the value count in `atttn`, `atttnn` or `atttnnn`
    pub fn count_digits(&self) -> usize {
        match self {
            MeasurementKind::Standard | MeasurementKind::Verification => 1,
            MeasurementKind::Concurrent | MeasurementKind::Continuous => 2,
            MeasurementKind::HighVolumeAscii | MeasurementKind::HighVolumeBinary => 3,
        }
    }

    pub fn max_values(&self) -> u16 {
        match self.count_digits() {
            1 => MAX_VALUES_M,
            2 => MAX_VALUES_C,
            _ => MAX_VALUES_H,
        }
    }

    /// Value characters allowed on one data page
    pub fn value_budget(&self) -> usize {
        match self {
            MeasurementKind::Standard | MeasurementKind::Verification => MAX_VALUES_CHARS_M,
            _ => MAX_VALUES_CHARS_C,
        }
    }

    /// Kinds whose sensor side keeps running while other sensors are addressed
    pub fn is_concurrent(&self) -> bool {
        matches!(
            self,
            MeasurementKind::Concurrent
                | MeasurementKind::HighVolumeAscii
                | MeasurementKind::HighVolumeBinary
        )
    }
}

/// Sensor engine state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorState {
    Standby,
    Ready,
    Measuring,
    MeasuringConcurrent,
    DataReady,
}

pub(crate) fn clip<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Identification fields returned by `aI!`
///
/// Fields longer than their protocol width are clipped. The sensor pads vendor, model and
/// firmware version with spaces on the wire; the master trims them again.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Identification {
    pub vendor: String<VENDOR_LEN>,
    pub model: String<MODEL_LEN>,
    pub firmware_version: String<FIRMWARE_VERSION_LEN>,
    pub serial: String<SERIAL_MAX_LEN>,
}

impl Identification {
    pub fn new(vendor: &str, model: &str, firmware_version: &str, serial: &str) -> Self {
        Identification {
            vendor: clip(vendor),
            model: clip(model),
            firmware_version: clip(firmware_version),
            serial: clip(serial),
        }
    }
}

/// Data type code of a high-volume binary packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryType {
    Invalid = 0,
    I8 = 1,
    U8 = 2,
    I16 = 3,
    U16 = 4,
    I32 = 5,
    U32 = 6,
    I64 = 7,
    U64 = 8,
    F32 = 9,
    F64 = 10,
}

impl BinaryType {
    /// Bytes per value, 0 for [`BinaryType::Invalid`]
    pub fn size(&self) -> usize {
        match self {
            BinaryType::Invalid => 0,
            BinaryType::I8 | BinaryType::U8 => 1,
            BinaryType::I16 | BinaryType::U16 => 2,
            BinaryType::I32 | BinaryType::U32 | BinaryType::F32 => 4,
            BinaryType::I64 | BinaryType::U64 | BinaryType::F64 => 8,
        }
    }
}

impl TryFrom<u8> for BinaryType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BinaryType::Invalid),
            1 => Ok(BinaryType::I8),
            2 => Ok(BinaryType::U8),
            3 => Ok(BinaryType::I16),
            4 => Ok(BinaryType::U16),
            5 => Ok(BinaryType::I32),
            6 => Ok(BinaryType::U32),
            7 => Ok(BinaryType::I64),
            8 => Ok(BinaryType::U64),
            9 => Ok(BinaryType::F32),
            10 => Ok(BinaryType::F64),
            _ => Err(crate::error::Error::ParseFailed),
        }
    }
}

/// Decoded `atttn` / `atttnn` / `atttnnn` response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeasurementResponse {
    pub address: char,
    pub wait_seconds: u16,
    pub value_count: u16,
    pub kind: MeasurementKind,
}

/// Values of one `aD`/`aR` response
#[derive(Clone, Debug, PartialEq)]
pub struct DataResponse {
    pub address: char,
    pub values: Vec<Value, MAX_VALUES_PER_RESPONSE>,
}

/// Decoded `aI!` response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentifyResponse {
    pub address: char,
    pub sdi12_version: String<2>,
    pub info: Identification,
}

/// Decoded `a,SHEF,units;` parameter metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamMetaResponse {
    pub address: char,
    pub shef: String<7>,
    pub units: String<23>,
}

/// A high-volume binary packet as returned by `aDBn!`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryPacket {
    pub address: char,
    pub data_type: BinaryType,
    pub payload: Vec<u8, BIN_MAX_PAYLOAD>,
}

impl BinaryPacket {
    /// Payload decoded as little-endian values of `data_type`
    ///
    /// Trailing bytes that do not form a whole value are ignored.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let data_type = self.data_type;
        let chunks = match data_type.size() {
            0 => self.payload[..0].chunks_exact(1),
            size => self.payload.chunks_exact(size),
        };
        chunks.map(move |chunk| decode_le(data_type, chunk))
    }
}

fn le<const N: usize>(chunk: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&chunk[..N]);
    bytes
}

fn decode_le(data_type: BinaryType, chunk: &[u8]) -> f64 {
    match data_type {
        BinaryType::Invalid => 0.0,
        BinaryType::I8 => f64::from(chunk[0] as i8),
        BinaryType::U8 => f64::from(chunk[0]),
        BinaryType::I16 => f64::from(i16::from_le_bytes(le(chunk))),
        BinaryType::U16 => f64::from(u16::from_le_bytes(le(chunk))),
        BinaryType::I32 => f64::from(i32::from_le_bytes(le(chunk))),
        BinaryType::U32 => f64::from(u32::from_le_bytes(le(chunk))),
        BinaryType::I64 => i64::from_le_bytes(le(chunk)) as f64,
        BinaryType::U64 => u64::from_le_bytes(le(chunk)) as f64,
        BinaryType::F32 => f64::from(f32::from_le_bytes(le(chunk))),
        BinaryType::F64 => f64::from_le_bytes(le(chunk)),
    }
}
