use defmt::Formatter;

use crate::error::Error;
use crate::master::MultilineResponse;
use crate::types::{
    BinaryPacket, BinaryType, DataResponse, Direction, IdentifyResponse, Identification,
    MeasurementKind, MeasurementResponse, ParamMetaResponse, SensorState,
};
use crate::value::Value;

impl defmt::Format for Error {
    fn format(&self, fmt: Formatter<'_>) {
        let name = match self {
            Error::InvalidAddress => "InvalidAddress",
            Error::InvalidCommand => "InvalidCommand",
            Error::BufferOverflow => "BufferOverflow",
            Error::NotAddressed => "NotAddressed",
            Error::NoData => "NoData",
            Error::ParamLimitReached => "ParamLimitReached",
            Error::MissingCallback => "MissingCallback",
            Error::Timeout => "Timeout",
            Error::CrcMismatch => "CrcMismatch",
            Error::ParseFailed => "ParseFailed",
            Error::Aborted => "Aborted",
        };
        defmt::write!(fmt, "Error::{=str}", name)
    }
}

impl defmt::Format for Direction {
    fn format(&self, fmt: Formatter<'_>) {
        match self {
            Direction::Rx => defmt::write!(fmt, "Rx"),
            Direction::Tx => defmt::write!(fmt, "Tx"),
        }
    }
}

impl defmt::Format for MeasurementKind {
    fn format(&self, fmt: Formatter<'_>) {
        let name = match self {
            MeasurementKind::Standard => "Standard",
            MeasurementKind::Concurrent => "Concurrent",
            MeasurementKind::HighVolumeAscii => "HighVolumeAscii",
            MeasurementKind::HighVolumeBinary => "HighVolumeBinary",
            MeasurementKind::Verification => "Verification",
            MeasurementKind::Continuous => "Continuous",
        };
        defmt::write!(fmt, "{=str}", name)
    }
}

impl defmt::Format for SensorState {
    fn format(&self, fmt: Formatter<'_>) {
        let name = match self {
            SensorState::Standby => "Standby",
            SensorState::Ready => "Ready",
            SensorState::Measuring => "Measuring",
            SensorState::MeasuringConcurrent => "MeasuringConcurrent",
            SensorState::DataReady => "DataReady",
        };
        defmt::write!(fmt, "{=str}", name)
    }
}

impl defmt::Format for BinaryType {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "BinaryType({=u8})", *self as u8)
    }
}

impl defmt::Format for Value {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "{=f32} ({=u8} dp)", self.value, self.decimals)
    }
}

impl defmt::Format for Identification {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(
            fmt,
            "{} {} {} {}",
            self.vendor,
            self.model,
            self.firmware_version,
            self.serial
        )
    }
}

impl defmt::Format for MeasurementResponse {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(
            fmt,
            "{}: {} {=u16} values in {=u16}s",
            self.address,
            self.kind,
            self.value_count,
            self.wait_seconds
        )
    }
}

impl defmt::Format for DataResponse {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "{}: {}", self.address, self.values)
    }
}

impl defmt::Format for IdentifyResponse {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(
            fmt,
            "{}: v{} {}",
            self.address,
            self.sdi12_version,
            self.info
        )
    }
}

impl defmt::Format for ParamMetaResponse {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "{}: {} [{}]", self.address, self.shef, self.units)
    }
}

impl defmt::Format for BinaryPacket {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(
            fmt,
            "{}: {} {=usize} bytes",
            self.address,
            self.data_type,
            self.payload.len()
        )
    }
}

impl defmt::Format for MultilineResponse {
    fn format(&self, fmt: Formatter<'_>) {
        defmt::write!(fmt, "{=usize} lines, {=usize} bytes", self.lines, self.len)
    }
}
