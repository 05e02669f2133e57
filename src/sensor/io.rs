use crate::types::{BinaryType, Direction, MeasurementKind};
use crate::value::Value;

/// Hardware and application hooks the sensor engine calls into.
///
/// The first three methods are required. The rest describe optional capabilities and their
/// default implementations report "not supported", which makes the engine fall back to its
/// synchronous behaviour.
pub trait SensorIo {
    /// Transmits a complete response. Direction switching is done by the engine around it.
    fn send_response(&mut self, data: &[u8]);

    fn set_direction(&mut self, direction: Direction);

    /// Reads the parameter at `index` in registration order
    fn read_param(&mut self, index: usize) -> Value;

    /// Starts an asynchronous acquisition of `group`.
    ///
    /// Returns the seconds until data is ready (`0` means the values can be read right away)
    /// or `None` when the application measures synchronously only. A non-zero wait must be
    /// followed by [`crate::sensor::Sensor::measurement_done`].
    fn start_measurement(&mut self, _group: u8, _kind: MeasurementKind) -> Option<u16> {
        None
    }

    /// Sends the unsolicited `a<CR><LF>` service request through a dedicated path.
    ///
    /// Returns `false` when not implemented, the engine then sends it with
    /// [`SensorIo::send_response`].
    fn service_request(&mut self, _address: char) -> bool {
        false
    }

    /// Persists a new address
    fn save_address(&mut self, _address: char) {}

    /// Returns a previously persisted address
    fn load_address(&mut self) -> Option<char> {
        None
    }

    /// Encodes `page` of a high-volume binary measurement into `buf`.
    ///
    /// Returns the payload type and the number of payload bytes written, `None` when binary
    /// output is not supported.
    fn format_binary_page(
        &mut self,
        _page: u16,
        _values: &[Value],
        _buf: &mut [u8],
    ) -> Option<(BinaryType, usize)> {
        None
    }
}
