//! Data recorder side of the bus
//!
//! [`Master`] builds commands, moves them through a [`MasterIo`] and decodes the answers.
//! Every transaction follows the same path: build the command, switch to transmit, send,
//! switch to receive, wait for the response and decode it. Command and response buffers are
//! owned by the instance and reused between calls.
//!
//! The master does not retry. A [`Error::Timeout`] is a normal outcome (an absent sensor, an
//! unsupported command) and is left to the caller.
mod io;
pub mod parse;

use core::fmt::{self, Write};
use core::time::Duration;
use heapless::{String, Vec};
use log::{debug, trace};

use crate::address::{address_from_byte, is_valid_address, QUERY_ADDRESS};
use crate::crc::{self, Crc16Digest};
use crate::error::Error;
use crate::timing::Timing;
use crate::types::{
    BinaryPacket, BinaryType, DataResponse, Direction, IdentifyResponse, MeasurementKind,
    MeasurementResponse, ParamMetaResponse,
};
use crate::{BIN_MAX_PAYLOAD, MAX_COMMAND_LEN, MAX_GROUPS, MAX_HV_DATA_PAGES, MAX_RESPONSE_LEN};

pub use io::MasterIo;
pub use parse::{
    parse_binary_packet, parse_data_response, parse_data_values, parse_identification,
    parse_measurement_response, parse_param_meta,
};

/// Result of [`Master::extended_multiline`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MultilineResponse {
    /// Bytes written to the output buffer
    pub len: usize,
    /// Lines received, including ones that no longer fit the output buffer
    pub lines: usize,
}

pub struct Master<IO: MasterIo> {
    io: IO,
    timing: Timing,
    cmd: String<MAX_COMMAND_LEN>,
    resp: Vec<u8, MAX_RESPONSE_LEN>,
}

fn check_address(address: char) -> Result<(), Error> {
    if is_valid_address(address) {
        Ok(())
    } else {
        Err(Error::InvalidAddress)
    }
}

fn check_group(group: u8) -> Result<(), Error> {
    if group < MAX_GROUPS {
        Ok(())
    } else {
        Err(Error::InvalidCommand)
    }
}

fn check_page(page: u16) -> Result<(), Error> {
    if page < MAX_HV_DATA_PAGES {
        Ok(())
    } else {
        Err(Error::InvalidCommand)
    }
}

fn copy_clipped(src: &[u8], dst: &mut [u8]) -> usize {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

/// Fills `buf` completely, a silent bus before that is a timeout
fn recv_exact<IO: MasterIo>(io: &mut IO, buf: &mut [u8], timeout: Duration) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = io.recv(&mut buf[filled..], timeout);
        if n == 0 {
            trace!("rx timeout after {} of {} bytes", filled, buf.len());
            return Err(Error::Timeout);
        }
        filled += n;
    }
    Ok(())
}

impl<IO: MasterIo> Master<IO> {
    pub fn new(io: IO) -> Self {
        Self::with_timing(io, Timing::default())
    }

    pub fn with_timing(io: IO, timing: Timing) -> Self {
        Master {
            io,
            timing,
            cmd: String::new(),
            resp: Vec::new(),
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Break followed by the post-break marking
    pub fn send_break(&mut self) {
        self.io.send_break();
        self.io.delay(self.timing.post_break_mark);
    }

    /// Sends `command` verbatim and returns the raw response, terminator included
    pub fn transact(&mut self, command: &str, timeout: Duration) -> Result<&[u8], Error> {
        self.cmd.clear();
        self.cmd
            .push_str(command)
            .map_err(|_| Error::InvalidCommand)?;
        self.exchange(timeout)?;
        Ok(&self.resp)
    }

    /// `a!`
    ///
    /// `Ok(false)` when nothing answers, `Ok(true)` when the addressed sensor does.
    pub fn acknowledge(&mut self, address: char) -> Result<bool, Error> {
        check_address(address)?;
        self.command(format_args!("{}!", address))?;
        match self.exchange(self.timing.response_timeout) {
            Ok(()) => {}
            Err(Error::Timeout) => return Ok(false),
            Err(e) => return Err(e),
        }
        if self.first_byte() == Some(address as u8) {
            Ok(true)
        } else {
            debug!("acknowledge for {} answered by {:?}", address, self.first_byte());
            Err(Error::ParseFailed)
        }
    }

    /// `?!`, only meaningful with a single sensor on the bus
    pub fn query_address(&mut self) -> Result<char, Error> {
        self.command(format_args!("{}!", QUERY_ADDRESS))?;
        self.exchange(self.timing.response_timeout)?;
        self.first_byte()
            .and_then(address_from_byte)
            .ok_or(Error::InvalidAddress)
    }

    /// `aAb!`
    ///
    /// Sensors may need up to [`crate::timing::ADDRESS_CHANGE_DELAY`] before they answer on
    /// the new address.
    pub fn change_address(&mut self, from: char, to: char) -> Result<(), Error> {
        check_address(from)?;
        check_address(to)?;
        self.command(format_args!("{}A{}!", from, to))?;
        self.exchange(self.timing.response_timeout)?;
        if self.first_byte() == Some(to as u8) {
            Ok(())
        } else {
            Err(Error::InvalidAddress)
        }
    }

    /// `aI!`
    pub fn identify(&mut self, address: char) -> Result<IdentifyResponse, Error> {
        check_address(address)?;
        self.command(format_args!("{}I!", address))?;
        self.exchange(self.timing.response_timeout)?;
        parse_identification(&self.resp)
    }

    /// Starts a measurement of `kind`
    ///
    /// `group` selects `aM1!`..`aM9!` and `aC1!`..`aC9!`, it is ignored by the other
    /// families. Continuous measurements have no start command, use [`Master::continuous`].
    pub fn start_measurement(
        &mut self,
        address: char,
        kind: MeasurementKind,
        group: u8,
        crc: bool,
    ) -> Result<MeasurementResponse, Error> {
        check_address(address)?;
        check_group(group)?;
        let family = match kind {
            MeasurementKind::Standard => "M",
            MeasurementKind::Concurrent => "C",
            MeasurementKind::Verification => "V",
            MeasurementKind::HighVolumeAscii => "HA",
            MeasurementKind::HighVolumeBinary => "HB",
            MeasurementKind::Continuous => return Err(Error::InvalidCommand),
        };
        let crc = crc && kind != MeasurementKind::Verification;
        let group = match kind {
            MeasurementKind::Standard | MeasurementKind::Concurrent if group > 0 => Some(group),
            _ => None,
        };

        self.cmd.clear();
        write!(self.cmd, "{}{}", address, family).map_err(|_| Error::InvalidCommand)?;
        if crc {
            self.cmd.push('C').map_err(|_| Error::InvalidCommand)?;
        }
        if let Some(group) = group {
            write!(self.cmd, "{}", group).map_err(|_| Error::InvalidCommand)?;
        }
        self.cmd.push('!').map_err(|_| Error::InvalidCommand)?;

        self.exchange(self.timing.response_timeout)?;
        parse_measurement_response(&self.resp, kind)
    }

    /// `aV!`
    pub fn verify(&mut self, address: char) -> Result<MeasurementResponse, Error> {
        self.start_measurement(address, MeasurementKind::Verification, 0, false)
    }

    /// Waits for the `a<CR><LF>` a sensor sends when a non-concurrent measurement is done
    ///
    /// See [`Timing::service_request_timeout`] for a suitable `timeout`. Anything but the
    /// expected address counts as a timeout.
    pub fn wait_service_request(&mut self, address: char, timeout: Duration) -> Result<(), Error> {
        check_address(address)?;
        self.receive(timeout)?;
        if self.first_byte() == Some(address as u8) {
            Ok(())
        } else {
            trace!("unexpected service request {:?}", self.first_byte());
            Err(Error::Timeout)
        }
    }

    /// `aD0!`..`aD999!`; with `crc` the response CRC is verified before decoding
    pub fn get_data(&mut self, address: char, page: u16, crc: bool) -> Result<DataResponse, Error> {
        check_address(address)?;
        check_page(page)?;
        self.command(format_args!("{}D{}!", address, page))?;
        self.exchange(self.timing.response_timeout)?;
        parse_data_response(&self.resp, crc)
    }

    /// `aR0!`..`aR9!` or `aRC0!`..`aRC9!`
    pub fn continuous(&mut self, address: char, index: u8, crc: bool) -> Result<DataResponse, Error> {
        check_address(address)?;
        check_group(index)?;
        let crc_flag = if crc { "C" } else { "" };
        self.command(format_args!("{}R{}{}!", address, crc_flag, index))?;
        self.exchange(self.timing.response_timeout)?;
        parse_data_response(&self.resp, crc)
    }

    /// `aI<body>!`, e.g. `body` = `"MC2"`, `"HA"` or `"R0"`
    ///
    /// `kind` selects the width of the count field. Sensors not supporting the query stay
    /// silent, which surfaces as [`Error::Timeout`].
    pub fn identify_measurement(
        &mut self,
        address: char,
        body: &str,
        kind: MeasurementKind,
    ) -> Result<MeasurementResponse, Error> {
        check_address(address)?;
        self.command(format_args!("{}I{}!", address, body))?;
        self.exchange(self.timing.response_timeout)?;
        parse_measurement_response(&self.resp, kind)
    }

    /// `aI<body>_nnn!` for the 1-based parameter `param`
    pub fn identify_param(
        &mut self,
        address: char,
        body: &str,
        param: u16,
    ) -> Result<ParamMetaResponse, Error> {
        check_address(address)?;
        check_page(param)?;
        self.command(format_args!("{}I{}_{:03}!", address, body, param))?;
        self.exchange(self.timing.response_timeout)?;
        parse_param_meta(&self.resp)
    }

    /// Raw `aDn!` page after a high-volume ASCII measurement
    ///
    /// Copies the response without address and terminator into `out` and returns the number
    /// of bytes written. A CRC, when requested, stays in place.
    pub fn get_hv_data(&mut self, address: char, page: u16, out: &mut [u8]) -> Result<usize, Error> {
        check_address(address)?;
        check_page(page)?;
        self.command(format_args!("{}D{}!", address, page))?;
        self.exchange(self.timing.response_timeout)?;
        match self.response().split_first() {
            Some((_, rest)) => Ok(copy_clipped(rest, out)),
            None => Err(Error::ParseFailed),
        }
    }

    /// `aDB0!`..`aDB999!`
    ///
    /// The packet is read as it arrives: header, data type, payload and CRC. A declared
    /// payload above [`BIN_MAX_PAYLOAD`] is rejected before the payload is read.
    pub fn get_binary_data(&mut self, address: char, page: u16) -> Result<BinaryPacket, Error> {
        check_address(address)?;
        check_page(page)?;
        self.command(format_args!("{}DB{}!", address, page))?;
        self.send_command();

        let timeout = self.timing.response_timeout;
        let mut header = [0u8; 4];
        recv_exact(&mut self.io, &mut header[..3], timeout)?;
        let size = usize::from(u16::from_le_bytes([header[1], header[2]]));
        if size > BIN_MAX_PAYLOAD {
            debug!("binary packet declares {} bytes", size);
            return Err(Error::BufferOverflow);
        }
        recv_exact(&mut self.io, &mut header[3..], timeout)?;

        let mut payload: Vec<u8, BIN_MAX_PAYLOAD> = Vec::new();
        payload
            .resize_default(size)
            .map_err(|_| Error::BufferOverflow)?;
        recv_exact(&mut self.io, &mut payload, timeout)?;
        let mut received = [0u8; 2];
        recv_exact(&mut self.io, &mut received, timeout)?;
        trace!("rx binary packet, {} byte payload", size);

        let mut digest = Crc16Digest::new();
        digest.update(&header);
        digest.update(&payload);
        if crc::encode_binary(digest.finalize()) != received {
            debug!("binary packet CRC mismatch");
            return Err(Error::CrcMismatch);
        }

        let packet_address = address_from_byte(header[0])
            .filter(|a| *a == address)
            .ok_or(Error::ParseFailed)?;
        Ok(BinaryPacket {
            address: packet_address,
            data_type: BinaryType::try_from(header[3])?,
            payload,
        })
    }

    /// `aX<body>!`
    ///
    /// The raw response, terminator included, is copied into `out` up to its length.
    pub fn extended(
        &mut self,
        address: char,
        body: &str,
        out: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, Error> {
        check_address(address)?;
        self.command(format_args!("{}X{}!", address, body))?;
        self.exchange(timeout)?;
        Ok(copy_clipped(&self.resp, out))
    }

    /// [`Master::extended`] for commands answered with several lines
    ///
    /// The first line is awaited for `timeout`, later ones for the multi-line gap. Lines are
    /// concatenated raw into `out`; reading stops at the first gap without data.
    pub fn extended_multiline(
        &mut self,
        address: char,
        body: &str,
        out: &mut [u8],
        timeout: Duration,
    ) -> Result<MultilineResponse, Error> {
        let mut len = self.extended(address, body, out, timeout)?;
        let mut lines = 1;
        loop {
            match self.receive(self.timing.multiline_gap) {
                Ok(()) => {
                    len += copy_clipped(&self.resp, &mut out[len..]);
                    lines += 1;
                }
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(MultilineResponse { len, lines })
    }

    fn command(&mut self, args: fmt::Arguments<'_>) -> Result<(), Error> {
        self.cmd.clear();
        self.cmd.write_fmt(args).map_err(|_| Error::InvalidCommand)
    }

    fn send_command(&mut self) {
        trace!("tx {}", self.cmd);
        self.io.set_direction(Direction::Tx);
        self.io.send(self.cmd.as_bytes());
        self.io.set_direction(Direction::Rx);
    }

    fn receive(&mut self, timeout: Duration) -> Result<(), Error> {
        self.resp.clear();
        self.resp
            .resize_default(MAX_RESPONSE_LEN)
            .map_err(|_| Error::BufferOverflow)?;
        let n = self.io.recv(&mut self.resp, timeout).min(MAX_RESPONSE_LEN);
        self.resp.truncate(n);
        if n == 0 {
            trace!("rx timeout");
            return Err(Error::Timeout);
        }
        trace!("rx {} bytes: {}", n, self.resp.escape_ascii());
        Ok(())
    }

    fn exchange(&mut self, timeout: Duration) -> Result<(), Error> {
        self.send_command();
        self.receive(timeout)
    }

    fn response(&self) -> &[u8] {
        parse::trim_crlf(&self.resp)
    }

    fn first_byte(&self) -> Option<u8> {
        self.response().first().copied()
    }
}
