//! SDI-12 v1.4 protocol engine.
//!
//! Contains both sides of the bus: the [`sensor`] command dispatcher that answers recorder
//! commands, and the [`master`] transaction driver a data recorder uses to talk to sensors.
//! Both share the wire codecs in [`crc`] and [`value`].
//!
//! Physical I/O is not part of this crate. Each engine is generic over a collaborator trait
//! ([`sensor::SensorIo`], [`master::MasterIo`]) which moves already framed bytes and controls
//! the bus direction.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod address;
pub mod crc;
pub mod error;
pub mod master;
pub mod sensor;
pub mod timing;
pub mod types;
pub mod value;

// include defmt::Format implementations
// we don't want them derive()d in the modules unless defmt-impl feature is set
#[cfg(feature = "defmt-impl")]
pub mod defmt;

// reexport heapless
pub use heapless;

pub use address::is_valid_address;
pub use error::Error;
pub use value::Value;

/// SDI-12 version reported in the identification response
pub const PROTOCOL_VERSION: &str = "14";

/// Longest textual response line including address and CR LF
pub const MAX_RESPONSE_LEN: usize = 82;
/// Longest command accepted by the master, terminator included
pub const MAX_COMMAND_LEN: usize = 20;

pub const MAX_PARAMS: usize = 20;
pub const MAX_EXTENDED_COMMANDS: usize = 8;
/// Measurement groups `0`..=`9`
pub const MAX_GROUPS: u8 = 10;

/// Value characters allowed on one `aD` page after `aM!`/`aV!`
pub const MAX_VALUES_CHARS_M: usize = 35;
/// Value characters allowed on one `aD`/`aR` page after `aC!`, `aR!` or `aHA!`
pub const MAX_VALUES_CHARS_C: usize = 75;
/// Longest single formatted value: sign, up to 7 digits and a decimal point
pub const VALUE_MAX_CHARS: usize = 9;

pub const MAX_VALUES_M: u16 = 9;
pub const MAX_VALUES_C: u16 = 99;
pub const MAX_VALUES_H: u16 = 999;

/// Pages `aD0!`..=`aD9!`
pub const MAX_DATA_PAGES: u16 = 10;
/// Pages `aD0!`..=`aD999!` after a high-volume measurement
pub const MAX_HV_DATA_PAGES: u16 = 1000;

pub const VENDOR_LEN: usize = 8;
pub const MODEL_LEN: usize = 6;
pub const FIRMWARE_VERSION_LEN: usize = 3;
pub const SERIAL_MAX_LEN: usize = 13;

pub const SHEF_MAX_LEN: usize = 3;
pub const UNITS_MAX_LEN: usize = 20;
pub const XCMD_PREFIX_MAX_LEN: usize = 15;

/// Largest payload of a high-volume binary packet
pub const BIN_MAX_PAYLOAD: usize = 1000;
/// address + size(2) + type + CRC(2)
pub const BIN_PACKET_OVERHEAD: usize = 6;
pub const BIN_MAX_PACKET: usize = BIN_MAX_PAYLOAD + BIN_PACKET_OVERHEAD;
