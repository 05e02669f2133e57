//! Bus timing
//!
//! Nominal values of the SDI-12 v1.4 timing table, rounded up to whole milliseconds where the
//! protocol specifies fractions. Line settings are 1200 baud, 7 data bits, even parity, 1 stop bit.
use core::time::Duration;

pub const BAUD_RATE: u32 = 1200;

/// Shortest spacing the recorder must hold to wake sensors
pub const BREAK: Duration = Duration::from_millis(12);
/// Marking after a break before the first command character (8.33 ms)
pub const MARK_AFTER_BREAK: Duration = Duration::from_millis(9);
/// A sensor starts its response within this time after the command stop bit
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(15);
/// Longest marking allowed between two characters of a command or response (1.66 ms)
pub const INTER_CHAR_MAX: Duration = Duration::from_millis(2);
/// Marking longer than this requires a break before the next command
pub const MARKING_TIMEOUT: Duration = Duration::from_millis(87);
/// Marking after which a sensor drops back to standby
pub const STANDBY_TIMEOUT: Duration = Duration::from_millis(100);
/// Shortest wait before retrying an unanswered command (16.67 ms)
pub const RETRY_MIN: Duration = Duration::from_millis(17);
/// Longest gap between lines of a multi-line response
pub const MULTILINE_GAP: Duration = Duration::from_millis(150);
/// Time a sensor may need to persist a new address after `aAb!`
pub const ADDRESS_CHANGE_DELAY: Duration = Duration::from_millis(1000);

/// Timing used by [`crate::master::Master`]
///
/// `Default` yields the protocol values. Adapters with extra latency (USB serial bridges,
/// radio links) can widen the windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Marking held after the break before the command goes out
    pub post_break_mark: Duration,
    /// Wait for the first response byte of a regular command
    pub response_timeout: Duration,
    /// Wait for each further line of a multi-line response
    pub multiline_gap: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            post_break_mark: MARK_AFTER_BREAK,
            response_timeout: RESPONSE_TIMEOUT,
            multiline_gap: MULTILINE_GAP,
        }
    }
}

impl Timing {
    /// Timeout for a service request announced with `ttt` seconds
    ///
    /// Sensors may answer up to one response window after the announced time.
    pub fn service_request_timeout(&self, wait_seconds: u16) -> Duration {
        Duration::from_secs(u64::from(wait_seconds)) + self.response_timeout
    }
}
