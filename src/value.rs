//! Sign-prefixed numeric values as they appear in `aD`/`aR` responses, e.g. `+3.14-2.7+42`
use core::fmt::Write;
use heapless::{String, Vec};

use crate::error::Error;
use crate::VALUE_MAX_CHARS;

/// Most digits a value may carry after the decimal point
pub const MAX_DECIMALS: u8 = 7;

pub type FormattedValue = String<VALUE_MAX_CHARS>;

/// A measured value together with the number of decimal places it is reported with
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Value {
    pub value: f32,
    pub decimals: u8,
}

impl Value {
    pub fn new(value: f32, decimals: u8) -> Self {
        Value { value, decimals }
    }

    /// Renders the value with an explicit sign (`+` for zero and positives).
    ///
    /// With zero decimals the magnitude is truncated to an integer. Values which do not fit
    /// in [`VALUE_MAX_CHARS`] fail with [`Error::BufferOverflow`], non-finite values with
    /// [`Error::NoData`].
    pub fn format(&self) -> Result<FormattedValue, Error> {
        if !self.value.is_finite() {
            return Err(Error::NoData);
        }
        let sign = if self.value >= 0.0 { '+' } else { '-' };
        let magnitude = self.value.abs();
        let mut out = FormattedValue::new();
        let written = if self.decimals == 0 {
            write!(out, "{}{}", sign, magnitude as u64)
        } else {
            let decimals = self.decimals.min(MAX_DECIMALS) as usize;
            write!(out, "{}{:.*}", sign, decimals, magnitude)
        };
        written.map_err(|_| Error::BufferOverflow)?;
        Ok(out)
    }
}

/// Extracts up to `N` values from the value section of a response (address already removed).
///
/// With `crc` set the trailing 3 CRC characters are excluded from the scan. They are not
/// checked here; callers verify them with [`crate::crc::verify`] on the whole line first.
///
/// Bytes which cannot start a value are skipped one at a time and a sign with no digits after
/// it is dropped, so stray spaces or line noise never abort the parse.
pub fn parse_all<const N: usize>(text: &[u8], crc: bool) -> Vec<Value, N> {
    let mut values = Vec::new();
    let end = if crc {
        text.len().saturating_sub(3)
    } else {
        text.len()
    };
    let text = &text[..end];

    let mut pos = 0;
    while pos < text.len() && !values.is_full() {
        if text[pos] != b'+' && text[pos] != b'-' {
            pos += 1;
            continue;
        }
        let start = pos;
        pos += 1;
        while pos < text.len() && (text[pos].is_ascii_digit() || text[pos] == b'.') {
            pos += 1;
        }
        if pos > start + 1 {
            // capacity was checked by the loop condition
            let _ = values.push(parse_token(&text[start..pos]));
        }
    }
    values
}

// token is a sign followed by at least one digit or dot
fn parse_token(token: &[u8]) -> Value {
    let numeric = match token[1..].iter().position(|b| *b == b'.') {
        Some(dot) => {
            let after = dot + 2;
            let second_dot = token[after..]
                .iter()
                .position(|b| *b == b'.')
                .map(|p| after + p)
                .unwrap_or(token.len());
            &token[..second_dot]
        }
        None => token,
    };
    let decimals = match numeric.iter().position(|b| *b == b'.') {
        Some(dot) => (numeric.len() - dot - 1).min(u8::MAX as usize) as u8,
        None => 0,
    };
    let value = core::str::from_utf8(numeric)
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(0.0);
    Value { value, decimals }
}
