//! Sensor side of the bus
//!
//! [`Sensor`] answers recorder commands. The application feeds it complete command lines with
//! [`Sensor::process`], reports break conditions with [`Sensor::break_signal`] and, for
//! asynchronous acquisitions, hands the finished values back with
//! [`Sensor::measurement_done`]. All bus traffic goes through the [`SensorIo`] collaborator.
//!
//! ```ignore - needs a SensorIo implementation
//! let mut sensor = Sensor::new('0', Identification::new("ACME", "TH01", "100", "SN1"), io)?;
//! sensor.register_param(0, "TA", "C", 2)?;
//! sensor.process(b"0M!")?; // -> "00001\r\n"
//! sensor.process(b"0D0!")?; // -> "0+21.50\r\n"
//! ```
use heapless::{String, Vec};
use log::{debug, trace, warn};

use crate::address::{is_valid_address, QUERY_ADDRESS};
use crate::crc;
use crate::error::Error;
use crate::types::{
    clip, BinaryType, Direction, Identification, MeasurementKind, SensorState,
};
use crate::value::Value;
use crate::{
    BIN_MAX_PAYLOAD, FIRMWARE_VERSION_LEN, MAX_EXTENDED_COMMANDS, MAX_GROUPS, MAX_PARAMS,
    MODEL_LEN, PROTOCOL_VERSION, SHEF_MAX_LEN, UNITS_MAX_LEN, VENDOR_LEN, XCMD_PREFIX_MAX_LEN,
};

pub mod command;
pub mod io;

pub use command::Command;
pub use io::SensorIo;

/// Response buffer capacity, large enough for a full binary packet and for the framed text
/// variant of a binary page (`a` + type + payload + CRC + CR LF)
pub const RESPONSE_CAPACITY: usize = BIN_MAX_PAYLOAD + 8;

pub type ResponseBuf = Vec<u8, RESPONSE_CAPACITY>;

/// Handler of an extended `aX...!` command.
///
/// Receives the collaborator, the command body after `X` (the registered prefix included) and
/// the response buffer already holding the sensor address. Missing `<CR><LF>` is added after a
/// successful return. On error nothing is transmitted.
pub type ExtendedHandler<IO> = fn(&mut IO, &str, &mut ResponseBuf) -> Result<(), Error>;

/// A registered measurement parameter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub group: u8,
    pub shef: String<SHEF_MAX_LEN>,
    pub units: String<UNITS_MAX_LEN>,
    /// Decimal places the application should report this parameter with
    pub decimals: u8,
}

struct ExtendedCommand<IO> {
    prefix: String<XCMD_PREFIX_MAX_LEN>,
    handler: ExtendedHandler<IO>,
}

/// What the last measurement command asked for; drives `aD` formatting
#[derive(Clone, Copy, Debug)]
struct Pending {
    kind: MeasurementKind,
    group: u8,
    crc: bool,
}

pub struct Sensor<IO: SensorIo> {
    io: IO,
    address: char,
    ident: Identification,
    state: SensorState,
    params: Vec<Param, MAX_PARAMS>,
    xcmds: Vec<ExtendedCommand<IO>, MAX_EXTENDED_COMMANDS>,
    /// `None` while a measurement is pending, after an abort or before the first measurement
    cache: Option<Vec<Value, MAX_PARAMS>>,
    pending: Pending,
    resp: ResponseBuf,
}

impl<IO: SensorIo> Sensor<IO> {
    /// Creates a sensor in [`SensorState::Ready`].
    ///
    /// An address persisted through [`SensorIo::load_address`] takes precedence over `address`
    /// when it is valid.
    pub fn new(address: char, ident: Identification, mut io: IO) -> Result<Self, Error> {
        if !is_valid_address(address) {
            return Err(Error::InvalidAddress);
        }
        let address = match io.load_address() {
            Some(stored) if is_valid_address(stored) => stored,
            _ => address,
        };
        debug!("sensor initialized at address {}", address);
        Ok(Sensor {
            io,
            address,
            ident,
            state: SensorState::Ready,
            params: Vec::new(),
            xcmds: Vec::new(),
            cache: None,
            pending: Pending {
                kind: MeasurementKind::Standard,
                group: 0,
                crc: false,
            },
            resp: Vec::new(),
        })
    }

    /// Appends a parameter to measurement group `group` (0-9).
    ///
    /// SHEF code and units are clipped to 3 and 20 characters.
    pub fn register_param(
        &mut self,
        group: u8,
        shef: &str,
        units: &str,
        decimals: u8,
    ) -> Result<(), Error> {
        if self.params.is_full() {
            return Err(Error::ParamLimitReached);
        }
        if group >= MAX_GROUPS {
            return Err(Error::InvalidCommand);
        }
        self.params
            .push(Param {
                group,
                shef: clip(shef),
                units: clip(units),
                decimals,
            })
            .map_err(|_| Error::ParamLimitReached)
    }

    /// Registers a handler for `aX<prefix>...!`. The first matching prefix wins.
    pub fn register_extended_command(
        &mut self,
        prefix: &str,
        handler: ExtendedHandler<IO>,
    ) -> Result<(), Error> {
        self.xcmds
            .push(ExtendedCommand {
                prefix: clip(prefix),
                handler,
            })
            .map_err(|_| Error::ParamLimitReached)
    }

    /// Handles one command line, with or without its trailing `!`.
    ///
    /// Returns [`Error::NotAddressed`] for commands meant for other sensors and
    /// [`Error::InvalidCommand`] for commands this sensor does not understand. Nothing is
    /// transmitted in both cases.
    pub fn process(&mut self, cmd: &[u8]) -> Result<(), Error> {
        let cmd = cmd.strip_suffix(b"!").unwrap_or(cmd);
        let (&target, body) = cmd.split_first().ok_or(Error::InvalidCommand)?;

        let is_query = target == QUERY_ADDRESS as u8 && body.is_empty();
        let is_addressed = target == self.address as u8;
        if !is_addressed && !is_query {
            trace!("ignoring command for address {}", target as char);
            return Err(Error::NotAddressed);
        }

        if self.state == SensorState::Standby {
            self.transition(SensorState::Ready);
        }
        if is_addressed && self.state == SensorState::MeasuringConcurrent {
            debug!("concurrent measurement aborted by addressed command");
            self.cache = None;
            self.transition(SensorState::Ready);
        }

        let command = Command::parse(body)?;
        debug!("dispatching {:?}", command);
        self.dispatch(command)
    }

    /// Stores the values of a finished asynchronous measurement.
    ///
    /// A standard measurement announces completion with a service request, a concurrent one
    /// does not. Fails with [`Error::Aborted`] when no measurement is in progress, e.g. after
    /// a break cancelled it.
    pub fn measurement_done(&mut self, values: &[Value]) -> Result<(), Error> {
        let was = self.state;
        if was != SensorState::Measuring && was != SensorState::MeasuringConcurrent {
            debug!("measurement completion ignored in state {:?}", was);
            return Err(Error::Aborted);
        }

        let n = values.len().min(MAX_PARAMS);
        self.cache = Some(Vec::from_slice(&values[..n]).map_err(|_| Error::BufferOverflow)?);
        self.transition(SensorState::DataReady);

        if was == SensorState::Measuring && !self.io.service_request(self.address) {
            self.begin_response()?;
            self.finish_line(false)?;
            self.send();
        }
        Ok(())
    }

    /// Break on the bus: cancels any measurement in progress and returns to Ready
    pub fn break_signal(&mut self) {
        if matches!(
            self.state,
            SensorState::Measuring | SensorState::MeasuringConcurrent
        ) {
            self.cache = None;
        }
        self.transition(SensorState::Ready);
    }

    /// Low power state, entered by the application after the line stayed marking for
    /// [`crate::timing::STANDBY_TIMEOUT`]. Ignored while a measurement is in progress. The next
    /// command for this sensor wakes it back to Ready.
    pub fn standby(&mut self) {
        if matches!(self.state, SensorState::Ready | SensorState::DataReady) {
            self.transition(SensorState::Standby);
        }
    }

    pub fn current_address(&self) -> char {
        self.address
    }

    pub fn current_state(&self) -> SensorState {
        self.state
    }

    /// Number of registered parameters in `group`
    pub fn group_count(&self, group: u8) -> u16 {
        self.params.iter().filter(|p| p.group == group).count() as u16
    }

    pub fn param(&self, index: usize) -> Option<&Param> {
        self.params.get(index)
    }

    pub fn identification(&self) -> &Identification {
        &self.ident
    }

    pub fn set_identification(&mut self, ident: Identification) {
        self.ident = ident;
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    fn transition(&mut self, next: SensorState) {
        if self.state != next {
            debug!("state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn dispatch(&mut self, command: Command<'_>) -> Result<(), Error> {
        let next = match command {
            Command::Acknowledge => {
                self.begin_response()?;
                self.finish_line(false)?;
                None
            }
            Command::Identify => {
                self.write_identification()?;
                None
            }
            Command::IdentifyMeasurement { kind, group } => {
                let count = self.group_count(group).min(kind.max_values());
                self.begin_response()?;
                self.push(b"000")?;
                self.push_digits(count, kind.count_digits())?;
                self.finish_line(false)?;
                None
            }
            Command::IdentifyParam {
                group, crc, param, ..
            } => {
                self.write_param_meta(group, crc, param)?;
                None
            }
            Command::IdentifyUnsupported { kind } => {
                self.begin_response()?;
                self.push(b"000")?;
                self.push_digits(0, kind.map(|k| k.count_digits()).unwrap_or(1))?;
                self.finish_line(false)?;
                None
            }
            Command::Measure { kind, group, crc } => self.start_measurement(kind, group, crc)?,
            Command::SendData { page } => {
                self.write_data(page)?;
                None
            }
            Command::SendBinaryData { page } => {
                self.write_binary_packet(page)?;
                None
            }
            Command::Continuous { group, crc } => {
                self.write_continuous(group, crc)?;
                None
            }
            Command::ChangeAddress(new) => {
                if !is_valid_address(new) {
                    return Err(Error::InvalidAddress);
                }
                debug!("address {} -> {}", self.address, new);
                self.address = new;
                self.io.save_address(new);
                self.begin_response()?;
                self.finish_line(false)?;
                None
            }
            Command::HighVolumeStub => {
                self.begin_response()?;
                self.push(b"000000")?;
                self.finish_line(false)?;
                None
            }
            Command::Extended(body) => {
                self.run_extended(body)?;
                None
            }
        };

        self.send();
        if let Some(next) = next {
            self.transition(next);
        }
        Ok(())
    }

    /// Writes `atttn[n[n]]` and returns the state to move to, `None` for a group without
    /// parameters.
    fn start_measurement(
        &mut self,
        kind: MeasurementKind,
        group: u8,
        crc: bool,
    ) -> Result<Option<SensorState>, Error> {
        self.pending = Pending { kind, group, crc };
        let n = self.group_count(group);

        self.begin_response()?;
        if n == 0 {
            self.push(b"000")?;
            self.push_digits(0, kind.count_digits())?;
            self.finish_line(false)?;
            return Ok(None);
        }

        let wait = match self.io.start_measurement(group, kind) {
            Some(wait) => wait.min(999),
            None => 0,
        };
        let next = if wait == 0 {
            self.read_group(group);
            SensorState::DataReady
        } else {
            self.cache = None;
            if kind.is_concurrent() {
                SensorState::MeasuringConcurrent
            } else {
                SensorState::Measuring
            }
        };

        self.push_digits(wait, 3)?;
        self.push_digits(n.min(kind.max_values()), kind.count_digits())?;
        self.finish_line(false)?;
        Ok(Some(next))
    }

    fn read_group(&mut self, group: u8) {
        let mut values = Vec::new();
        for (index, param) in self.params.iter().enumerate() {
            if param.group == group {
                // at most MAX_PARAMS parameters exist
                let _ = values.push(self.io.read_param(index));
            }
        }
        self.cache = Some(values);
    }

    fn write_identification(&mut self) -> Result<(), Error> {
        self.begin_response()?;
        self.push(PROTOCOL_VERSION.as_bytes())?;
        let ident = self.ident.clone();
        self.push_padded(&ident.vendor, VENDOR_LEN)?;
        self.push_padded(&ident.model, MODEL_LEN)?;
        self.push_padded(&ident.firmware_version, FIRMWARE_VERSION_LEN)?;
        self.push(ident.serial.as_bytes())?;
        self.finish_line(false)
    }

    fn write_param_meta(&mut self, group: u8, crc: bool, param: u16) -> Result<(), Error> {
        self.begin_response()?;
        let found = match param {
            0 => None,
            n => self
                .params
                .iter()
                .filter(|p| p.group == group)
                .nth(usize::from(n) - 1)
                .cloned(),
        };
        if let Some(meta) = found {
            self.push(b",")?;
            self.push(meta.shef.as_bytes())?;
            self.push(b",")?;
            self.push(meta.units.as_bytes())?;
            self.push(b";")?;
        }
        self.finish_line(crc)
    }

    fn write_data(&mut self, page: u16) -> Result<(), Error> {
        let Pending { kind, crc, .. } = self.pending;
        self.begin_response()?;
        let values = match &self.cache {
            Some(values) => values,
            None => return self.finish_line(crc),
        };

        if kind == MeasurementKind::HighVolumeBinary {
            // address + type + payload, framed as a text line
            self.resp
                .resize_default(2 + BIN_MAX_PAYLOAD)
                .map_err(|_| Error::BufferOverflow)?;
            if let Some((data_type, len)) =
                self.io
                    .format_binary_page(page, values, &mut self.resp[2..])
            {
                let len = len.min(BIN_MAX_PAYLOAD);
                self.resp[1] = if len > 0 {
                    data_type as u8
                } else {
                    BinaryType::Invalid as u8
                };
                self.resp.truncate(2 + len);
                return self.finish_line(crc);
            }
            self.resp.truncate(1);
        }

        write_page(&mut self.resp, values, page, kind.value_budget())?;
        self.finish_line(crc)
    }

    fn write_continuous(&mut self, group: u8, crc: bool) -> Result<(), Error> {
        self.pending = Pending {
            kind: MeasurementKind::Continuous,
            group,
            crc,
        };
        self.begin_response()?;
        if self.group_count(group) > 0 {
            self.read_group(group);
            if let Some(values) = &self.cache {
                write_page(
                    &mut self.resp,
                    values,
                    0,
                    MeasurementKind::Continuous.value_budget(),
                )?;
            }
        }
        self.finish_line(crc)
    }

    /// `address + size(2, LE) + type + payload + CRC(2, LE)`, no line terminator
    fn write_binary_packet(&mut self, page: u16) -> Result<(), Error> {
        self.begin_response()?;
        self.push(&[0, 0, 0])?;

        let formatted = match &self.cache {
            Some(values) => {
                self.resp
                    .resize_default(4 + BIN_MAX_PAYLOAD)
                    .map_err(|_| Error::BufferOverflow)?;
                self.io
                    .format_binary_page(page, values, &mut self.resp[4..])
            }
            None => None,
        };

        // an empty page is always the zero-length, zero-type packet
        let (data_type, len) = match formatted {
            Some((data_type, len)) if len > 0 => (data_type as u8, len.min(BIN_MAX_PAYLOAD)),
            _ => (BinaryType::Invalid as u8, 0),
        };
        self.resp.truncate(4 + len);
        self.resp[1..3].copy_from_slice(&(len as u16).to_le_bytes());
        self.resp[3] = data_type;

        let crc = crc::encode_binary(crc::crc16(&self.resp));
        self.push(&crc)
    }

    fn run_extended(&mut self, body: &[u8]) -> Result<(), Error> {
        self.begin_response()?;
        let text = core::str::from_utf8(body).map_err(|_| Error::InvalidCommand)?;
        let handler = self
            .xcmds
            .iter()
            .find(|x| text.starts_with(x.prefix.as_str()))
            .map(|x| x.handler);

        if let Some(handler) = handler {
            if let Err(e) = handler(&mut self.io, text, &mut self.resp) {
                warn!("extended command {} failed: {:?}", text, e);
                return Err(e);
            }
            if self.resp.ends_with(b"\r\n") {
                return Ok(());
            }
        }
        self.finish_line(false)
    }

    fn begin_response(&mut self) -> Result<(), Error> {
        self.resp.clear();
        self.push(&[self.address as u8])
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.resp
            .extend_from_slice(bytes)
            .map_err(|_| Error::BufferOverflow)
    }

    fn push_padded(&mut self, field: &str, width: usize) -> Result<(), Error> {
        self.push(field.as_bytes())?;
        for _ in field.len()..width {
            self.push(b" ")?;
        }
        Ok(())
    }

    /// Zero padded decimal, keeping the `width` least significant digits
    fn push_digits(&mut self, value: u16, width: usize) -> Result<(), Error> {
        for position in (0..width).rev() {
            let digit = (u32::from(value) / 10u32.pow(position as u32)) % 10;
            self.push(&[b'0' + digit as u8])?;
        }
        Ok(())
    }

    /// Terminates the response with `<CRC><CR><LF>` or `<CR><LF>`
    fn finish_line(&mut self, with_crc: bool) -> Result<(), Error> {
        if with_crc {
            let len = self.resp.len();
            crc::append(&mut self.resp, len)
        } else {
            self.push(b"\r\n")
        }
    }

    fn send(&mut self) {
        self.io.set_direction(Direction::Tx);
        self.io.send_response(&self.resp);
        self.io.set_direction(Direction::Rx);
    }
}

/// Appends the values of `page` to `out`.
///
/// Pages are filled greedily: a value which would push the page past `budget` characters opens
/// the next page, so a value ending exactly on the budget stays on the current one. Values
/// which cannot be rendered are skipped.
fn write_page<const N: usize>(
    out: &mut Vec<u8, N>,
    values: &[Value],
    page: u16,
    budget: usize,
) -> Result<(), Error> {
    let mut current = 0u16;
    let mut used = 0usize;
    for value in values {
        let text = match value.format() {
            Ok(text) => text,
            Err(e) => {
                warn!("skipping unformattable value {:?}: {:?}", value, e);
                continue;
            }
        };
        if used > 0 && used + text.len() > budget {
            current += 1;
            used = 0;
        }
        if current > page {
            break;
        }
        used += text.len();
        if current == page {
            out.extend_from_slice(text.as_bytes())
                .map_err(|_| Error::BufferOverflow)?;
        }
    }
    Ok(())
}
