//! Recorder commands as seen by a sensor
//!
//! [`Command::parse`] works on the command body: the address byte is already consumed and the
//! trailing `!` removed. Parsing is lenient the way field sensors are, characters after a
//! recognised command are ignored.
use crate::error::Error;
use crate::types::MeasurementKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `a!` and `?!`
    Acknowledge,
    /// `aI!`
    Identify,
    /// `aIM!`, `aIC2!`, `aIV!`, `aIHA!`, `aIR0!`, ...
    IdentifyMeasurement { kind: MeasurementKind, group: u8 },
    /// `aIM_001!`, `aIMC1_002!`, `aIR3_001!`, ... with a 1-based parameter number
    IdentifyParam {
        kind: MeasurementKind,
        group: u8,
        crc: bool,
        param: u16,
    },
    /// Metadata query for a family the sensor does not implement; answered with a zero count
    /// of the given family width (1 digit when unknown).
    IdentifyUnsupported { kind: Option<MeasurementKind> },
    /// `aM!`, `aMC3!`, `aC!`, `aCC1!`, `aV!`, `aHA!`, `aHBC!`
    Measure {
        kind: MeasurementKind,
        group: u8,
        crc: bool,
    },
    /// `aD0!`..`aD999!`
    SendData { page: u16 },
    /// `aDB0!`..`aDB999!`
    SendBinaryData { page: u16 },
    /// `aR0!`..`aR9!`, `aRC0!`..`aRC9!`
    Continuous { group: u8, crc: bool },
    /// `aAb!`
    ChangeAddress(char),
    /// `aH!` on its own
    HighVolumeStub,
    /// `aX<body>!`, body without the `X`
    Extended(&'a [u8]),
}

impl<'a> Command<'a> {
    pub fn parse(body: &'a [u8]) -> Result<Self, Error> {
        let (family, rest) = match body.split_first() {
            None => return Ok(Command::Acknowledge),
            Some((f, rest)) => (*f, rest),
        };
        match family {
            b'I' if rest.is_empty() => Ok(Command::Identify),
            b'I' => parse_identify_measurement(rest),
            b'M' => {
                let (crc, group) = crc_and_group(rest, b'1');
                Ok(Command::Measure {
                    kind: MeasurementKind::Standard,
                    group,
                    crc,
                })
            }
            b'C' => {
                let (crc, group) = crc_and_group(rest, b'1');
                Ok(Command::Measure {
                    kind: MeasurementKind::Concurrent,
                    group,
                    crc,
                })
            }
            b'V' => Ok(Command::Measure {
                kind: MeasurementKind::Verification,
                group: 0,
                crc: false,
            }),
            b'D' => match rest.split_first() {
                None => Err(Error::InvalidCommand),
                Some((b'B', page)) => Ok(Command::SendBinaryData {
                    page: parse_page(page),
                }),
                Some(_) => Ok(Command::SendData {
                    page: parse_page(rest),
                }),
            },
            b'R' => {
                let (crc, group) = crc_and_group(rest, b'0');
                Ok(Command::Continuous { group, crc })
            }
            b'A' => match rest.first() {
                Some(b) if (0x20..0x7F).contains(b) => Ok(Command::ChangeAddress(*b as char)),
                _ => Err(Error::InvalidAddress),
            },
            b'H' => match rest.split_first() {
                Some((b'A', tail)) => Ok(Command::Measure {
                    kind: MeasurementKind::HighVolumeAscii,
                    group: 0,
                    crc: tail.first() == Some(&b'C'),
                }),
                Some((b'B', tail)) => Ok(Command::Measure {
                    kind: MeasurementKind::HighVolumeBinary,
                    group: 0,
                    crc: tail.first() == Some(&b'C'),
                }),
                _ => Ok(Command::HighVolumeStub),
            },
            b'X' => Ok(Command::Extended(rest)),
            _ => Err(Error::InvalidCommand),
        }
    }
}

/// Optional `C` suffix followed by an optional group digit not below `first_group`
fn crc_and_group(rest: &[u8], first_group: u8) -> (bool, u8) {
    let crc = rest.first() == Some(&b'C');
    let digit = if crc { rest.get(1) } else { rest.first() };
    let group = match digit {
        Some(d) if (first_group..=b'9').contains(d) => d - b'0',
        _ => 0,
    };
    (crc, group)
}

/// Leading decimal digits, saturating
fn parse_page(digits: &[u8]) -> u16 {
    digits
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u16, |page, d| {
            page.saturating_mul(10).saturating_add(u16::from(d - b'0'))
        })
}

// body after `aI`
fn parse_identify_measurement(body: &[u8]) -> Result<Command<'_>, Error> {
    let (head, param) = match body.iter().position(|b| *b == b'_') {
        Some(underscore) => (&body[..underscore], Some(parse_page(&body[underscore + 1..]))),
        None => (body, None),
    };

    let (kind, group, crc) = match head.split_first() {
        Some((b'M', rest)) => {
            let (crc, group) = crc_and_group(rest, b'1');
            (Some(MeasurementKind::Standard), group, crc)
        }
        Some((b'C', rest)) => {
            let (crc, group) = crc_and_group(rest, b'1');
            (Some(MeasurementKind::Concurrent), group, crc)
        }
        Some((b'V', _)) => (Some(MeasurementKind::Verification), 0, false),
        Some((b'H', rest)) => match rest.split_first() {
            Some((b'A', tail)) => (
                Some(MeasurementKind::HighVolumeAscii),
                0,
                tail.first() == Some(&b'C'),
            ),
            Some((b'B', tail)) => (
                Some(MeasurementKind::HighVolumeBinary),
                0,
                tail.first() == Some(&b'C'),
            ),
            _ => {
                return Ok(Command::IdentifyUnsupported {
                    kind: Some(MeasurementKind::HighVolumeAscii),
                })
            }
        },
        Some((b'R', rest)) => {
            let (crc, group) = crc_and_group(rest, b'0');
            (Some(MeasurementKind::Continuous), group, crc)
        }
        _ => (None, 0, false),
    };

    match (kind, param) {
        (Some(kind), Some(param)) => Ok(Command::IdentifyParam {
            kind,
            group,
            crc,
            param,
        }),
        (Some(kind), None) => Ok(Command::IdentifyMeasurement { kind, group }),
        (None, Some(_)) => Err(Error::InvalidCommand),
        (None, None) => Ok(Command::IdentifyUnsupported { kind: None }),
    }
}
