use core::time::Duration;

use crate::types::Direction;

/// Bus access needed by [`crate::master::Master`]
pub trait MasterIo {
    /// Transmits a complete command
    fn send(&mut self, data: &[u8]);

    /// Receives into `buf`, waiting at most `timeout` for the first byte.
    ///
    /// Returns the number of bytes read, `0` on timeout. Text responses are expected to be
    /// returned one line at a time.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> usize;

    fn set_direction(&mut self, direction: Direction);

    /// Holds the line spacing for at least [`crate::timing::BREAK`]
    fn send_break(&mut self);

    fn delay(&mut self, duration: Duration);
}
