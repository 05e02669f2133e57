//! Decodes captured SDI-12 traffic.
//!
//! Every argument (or every stdin line when there are none) is `<decoder>:<data>` where the
//! data may spell the line terminator as `\r\n`:
//!
//! ```text
//! meas:M:00053
//! data:0+3.14+2.718+1.414Ipz\r\n
//! ident:014TESTCO  MOD001100SN123
//! crc:0+3.14OqZ
//! param:0,TA,degC;
//! bin:<packet as hex>
//! ```
use std::env;
use std::error::Error;
use std::io::{self, BufRead};
use std::process::ExitCode;

use sdi12::crc;
use sdi12::master::parse::{
    parse_binary_packet, parse_data_response, parse_identification, parse_measurement_response,
    parse_param_meta, trim_crlf,
};
use sdi12::types::MeasurementKind;

fn unescape(data: &str) -> Vec<u8> {
    data.replace("\\r", "\r").replace("\\n", "\n").into_bytes()
}

fn measurement_kind(name: &str) -> Option<MeasurementKind> {
    match name {
        "M" => Some(MeasurementKind::Standard),
        "C" => Some(MeasurementKind::Concurrent),
        "V" => Some(MeasurementKind::Verification),
        "HA" => Some(MeasurementKind::HighVolumeAscii),
        "HB" => Some(MeasurementKind::HighVolumeBinary),
        "R" => Some(MeasurementKind::Continuous),
        _ => None,
    }
}

fn decode(line: &str) -> Result<String, Box<dyn Error>> {
    let (decoder, data) = line
        .split_once(':')
        .ok_or("expected <decoder>:<data>")?;

    let decoded = match decoder {
        "meas" => {
            let (kind, data) = data.split_once(':').ok_or("expected meas:<kind>:<data>")?;
            let kind = measurement_kind(kind).ok_or("kind is one of M, C, V, HA, HB, R")?;
            let r = parse_measurement_response(&unescape(data), kind)?;
            format!(
                "address {} kind {:?} wait {}s values {}",
                r.address, r.kind, r.wait_seconds, r.value_count
            )
        }
        "data" => {
            let bytes = unescape(data);
            let has_crc = crc::verify(&bytes);
            let r = parse_data_response(&bytes, has_crc)?;
            let values: Vec<String> = r
                .values
                .iter()
                .map(|v| match v.format() {
                    Ok(text) => text.as_str().to_string(),
                    Err(_) => format!("{}", v.value),
                })
                .collect();
            format!(
                "address {} crc {} values [{}]",
                r.address,
                if has_crc { "ok" } else { "none" },
                values.join(", ")
            )
        }
        "ident" => {
            let r = parse_identification(&unescape(data))?;
            format!(
                "address {} version {} vendor {:?} model {:?} firmware {:?} serial {:?}",
                r.address,
                r.sdi12_version,
                r.info.vendor.as_str(),
                r.info.model.as_str(),
                r.info.firmware_version.as_str(),
                r.info.serial.as_str()
            )
        }
        "param" => {
            let r = parse_param_meta(&unescape(data))?;
            format!("address {} shef {} units {}", r.address, r.shef, r.units)
        }
        "crc" => {
            let bytes = unescape(data);
            let body = trim_crlf(&bytes);
            if body.len() < 3 {
                return Err("line too short to carry a CRC".into());
            }
            let (text, _) = body.split_at(body.len() - 3);
            let expected = crc::encode_ascii(crc::crc16(text));
            format!(
                "{} (expected {})",
                if crc::verify(&bytes) { "valid" } else { "invalid" },
                String::from_utf8_lossy(&expected)
            )
        }
        "bin" => {
            let bytes = base16::decode(data.trim())?;
            let p = parse_binary_packet(&bytes)?;
            let values: Vec<String> = p.values().map(|v| v.to_string()).collect();
            format!(
                "address {} type {:?} {} bytes values [{}]",
                p.address,
                p.data_type,
                p.payload.len(),
                values.join(", ")
            )
        }
        other => return Err(format!("unknown decoder {:?}", other).into()),
    };
    Ok(decoded)
}

fn main() -> ExitCode {
    let mut lines: Vec<String> = env::args().skip(1).collect();
    if lines.is_empty() {
        lines = io::stdin().lock().lines().map_while(Result::ok).collect();
    }

    let mut failed = false;
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        match decode(line) {
            Ok(decoded) => println!("{}", decoded),
            Err(e) => {
                eprintln!("{}: {}", line, e);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
