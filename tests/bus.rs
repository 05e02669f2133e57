//! A recorder talking to real sensors over an in-memory bus.
//!
//! The bus keeps a virtual clock: time only passes while the master waits in `recv` or
//! `delay`, and asynchronous measurements complete when the clock reaches their deadline.
use std::collections::VecDeque;
use std::time::Duration;

use sdi12::error::Error;
use sdi12::master::{Master, MasterIo};
use sdi12::sensor::{ResponseBuf, Sensor, SensorIo};
use sdi12::types::{BinaryType, Direction, Identification, MeasurementKind, SensorState};
use sdi12::value::Value;

#[derive(Default)]
struct Wire {
    outbox: Vec<u8>,
    values: Vec<Value>,
    wait: u16,
    scheduled: Option<u16>,
    saved: Option<char>,
}

impl SensorIo for Wire {
    fn send_response(&mut self, data: &[u8]) {
        self.outbox.extend_from_slice(data);
    }

    fn set_direction(&mut self, _direction: Direction) {}

    fn read_param(&mut self, index: usize) -> Value {
        self.values.get(index).copied().unwrap_or_default()
    }

    fn start_measurement(&mut self, _group: u8, _kind: MeasurementKind) -> Option<u16> {
        if self.wait > 0 {
            self.scheduled = Some(self.wait);
        }
        Some(self.wait)
    }

    fn save_address(&mut self, address: char) {
        self.saved = Some(address);
    }

    fn format_binary_page(
        &mut self,
        page: u16,
        values: &[Value],
        buf: &mut [u8],
    ) -> Option<(BinaryType, usize)> {
        if page > 0 {
            return Some((BinaryType::I32, 0));
        }
        let mut len = 0;
        for v in values {
            let raw = ((v.value * 100.0).round() as i32).to_le_bytes();
            buf[len..len + 4].copy_from_slice(&raw);
            len += 4;
        }
        Some((BinaryType::I32, len))
    }
}

struct Bus {
    sensors: Vec<Sensor<Wire>>,
    deadlines: Vec<Option<Duration>>,
    line: VecDeque<u8>,
    clock: Duration,
}

impl Bus {
    fn new(sensors: Vec<Sensor<Wire>>) -> Self {
        Bus {
            deadlines: vec![None; sensors.len()],
            sensors,
            line: VecDeque::new(),
            clock: Duration::ZERO,
        }
    }

    fn collect(&mut self) {
        for sensor in self.sensors.iter_mut() {
            let out = std::mem::take(&mut sensor.io_mut().outbox);
            self.line.extend(out);
        }
    }

    /// Lets the clock run, finishing measurements that come due
    fn advance(&mut self, by: Duration) {
        let until = self.clock + by;
        for (sensor, deadline) in self.sensors.iter_mut().zip(self.deadlines.iter_mut()) {
            if let Some(due) = *deadline {
                if due <= until {
                    *deadline = None;
                    let values = sensor.io().values.clone();
                    // a cancelled measurement reports Aborted, nothing to do
                    let _ = sensor.measurement_done(&values);
                }
            }
        }
        self.clock = until;
        self.collect();
    }
}

impl MasterIo for Bus {
    fn send(&mut self, data: &[u8]) {
        self.line.clear();
        for (sensor, deadline) in self.sensors.iter_mut().zip(self.deadlines.iter_mut()) {
            let _ = sensor.process(data);
            if let Some(seconds) = sensor.io_mut().scheduled.take() {
                *deadline = Some(self.clock + Duration::from_secs(u64::from(seconds)));
            }
        }
        self.collect();
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        if self.line.is_empty() {
            self.advance(timeout);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.line.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                    if b == b'\n' {
                        break;
                    }
                }
                None => break,
            }
        }
        n
    }

    fn set_direction(&mut self, _direction: Direction) {}

    fn send_break(&mut self) {
        for (sensor, deadline) in self.sensors.iter_mut().zip(self.deadlines.iter_mut()) {
            sensor.break_signal();
            *deadline = None;
        }
    }

    fn delay(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

fn reply_ok(_io: &mut Wire, _cmd: &str, resp: &mut ResponseBuf) -> Result<(), Error> {
    resp.extend_from_slice(b"OK").map_err(|_| Error::BufferOverflow)
}

fn reply_lines(_io: &mut Wire, _cmd: &str, resp: &mut ResponseBuf) -> Result<(), Error> {
    resp.extend_from_slice(b"L1\r\n1L2\r\n1L3\r\n")
        .map_err(|_| Error::BufferOverflow)
}

fn weather_station(address: char, wait: u16) -> Sensor<Wire> {
    let io = Wire {
        values: vec![
            Value::new(21.75, 2),
            Value::new(-3.5, 1),
            Value::new(1013.0, 0),
        ],
        wait,
        ..Default::default()
    };
    let ident = Identification::new("METEO", "WS200", "110", "0042");
    let mut sensor = Sensor::new(address, ident, io).unwrap();
    sensor.register_param(0, "TA", "degC", 2).unwrap();
    sensor.register_param(0, "TD", "degC", 1).unwrap();
    sensor.register_param(0, "PA", "hPa", 0).unwrap();
    sensor.register_param(1, "US", "m/s", 1).unwrap();
    sensor.register_extended_command("RST", reply_ok).unwrap();
    sensor.register_extended_command("LOG", reply_lines).unwrap();
    sensor
}

fn bus(sensors: Vec<Sensor<Wire>>) -> Master<Bus> {
    Master::new(Bus::new(sensors))
}

fn expected_values() -> Vec<Value> {
    vec![
        Value::new(21.75, 2),
        Value::new(-3.5, 1),
        Value::new(1013.0, 0),
    ]
}

#[test]
fn test_presence() {
    let mut m = bus(vec![weather_station('0', 0), weather_station('b', 0)]);
    m.send_break();
    assert_eq!(m.acknowledge('0'), Ok(true));
    assert_eq!(m.acknowledge('b'), Ok(true));
    assert_eq!(m.acknowledge('5'), Ok(false));
}

#[test]
fn test_query_single_sensor() {
    let mut m = bus(vec![weather_station('7', 0)]);
    assert_eq!(m.query_address(), Ok('7'));
}

#[test]
fn test_identify() {
    let mut m = bus(vec![weather_station('0', 0)]);
    let ident = m.identify('0').unwrap();
    assert_eq!(ident.address, '0');
    assert_eq!(ident.sdi12_version, "14");
    assert_eq!(ident.info, Identification::new("METEO", "WS200", "110", "0042"));
}

#[test]
fn test_change_address() {
    let mut m = bus(vec![weather_station('0', 0)]);
    m.change_address('0', 'x').unwrap();
    assert_eq!(m.acknowledge('x'), Ok(true));
    assert_eq!(m.acknowledge('0'), Ok(false));
    assert_eq!(m.io().sensors[0].io().saved, Some('x'));

    m.change_address('x', '0').unwrap();
    assert_eq!(m.acknowledge('0'), Ok(true));
}

#[test]
fn test_immediate_measurement() {
    let mut m = bus(vec![weather_station('0', 0)]);
    let r = m
        .start_measurement('0', MeasurementKind::Standard, 0, false)
        .unwrap();
    assert_eq!(r.wait_seconds, 0);
    assert_eq!(r.value_count, 3);

    let data = m.get_data('0', 0, false).unwrap();
    assert_eq!(&data.values[..], &expected_values()[..]);
}

#[test]
fn test_measurement_with_crc() {
    let mut m = bus(vec![weather_station('0', 0)]);
    m.start_measurement('0', MeasurementKind::Standard, 0, true)
        .unwrap();
    let data = m.get_data('0', 0, true).unwrap();
    assert_eq!(&data.values[..], &expected_values()[..]);

    let cont = m.continuous('0', 1, true).unwrap();
    assert_eq!(&cont.values[..], &[Value::new(0.0, 0)]);
}

#[test]
fn test_service_request() {
    let mut m = bus(vec![weather_station('0', 3)]);
    let r = m
        .start_measurement('0', MeasurementKind::Standard, 0, false)
        .unwrap();
    assert_eq!(r.wait_seconds, 3);
    assert_eq!(m.io().sensors[0].current_state(), SensorState::Measuring);

    let timeout = m.timing().service_request_timeout(r.wait_seconds);
    m.wait_service_request('0', timeout).unwrap();
    assert_eq!(m.io().sensors[0].current_state(), SensorState::DataReady);

    let data = m.get_data('0', 0, false).unwrap();
    assert_eq!(&data.values[..], &expected_values()[..]);
}

#[test]
fn test_service_request_too_early() {
    let mut m = bus(vec![weather_station('0', 3)]);
    m.start_measurement('0', MeasurementKind::Standard, 0, false)
        .unwrap();
    assert_eq!(
        m.wait_service_request('0', Duration::from_secs(1)),
        Err(Error::Timeout)
    );
    m.wait_service_request('0', Duration::from_secs(3)).unwrap();
}

#[test]
fn test_break_cancels_measurement() {
    let mut m = bus(vec![weather_station('0', 3)]);
    m.start_measurement('0', MeasurementKind::Standard, 0, false)
        .unwrap();
    m.send_break();
    assert_eq!(m.io().sensors[0].current_state(), SensorState::Ready);
    assert_eq!(
        m.wait_service_request('0', Duration::from_secs(5)),
        Err(Error::Timeout)
    );
    let data = m.get_data('0', 0, false).unwrap();
    assert!(data.values.is_empty());
}

#[test]
fn test_concurrent_measurements() {
    let mut m = bus(vec![weather_station('1', 2), weather_station('2', 4)]);
    let first = m
        .start_measurement('1', MeasurementKind::Concurrent, 0, false)
        .unwrap();
    let second = m
        .start_measurement('2', MeasurementKind::Concurrent, 0, false)
        .unwrap();
    assert_eq!(first.value_count, 3);
    assert_eq!(second.wait_seconds, 4);

    // concurrent measurements finish without a service request
    m.io_mut().delay(Duration::from_secs(5));
    assert!(m.io().line.is_empty());

    for address in ['1', '2'].iter() {
        let data = m.get_data(*address, 0, false).unwrap();
        assert_eq!(data.address, *address);
        assert_eq!(&data.values[..], &expected_values()[..]);
    }
}

#[test]
fn test_concurrent_measurement_aborted() {
    let mut m = bus(vec![weather_station('1', 2)]);
    m.start_measurement('1', MeasurementKind::Concurrent, 0, false)
        .unwrap();
    // addressing the sensor before the measurement is done aborts it
    let data = m.get_data('1', 0, false).unwrap();
    assert!(data.values.is_empty());

    m.io_mut().delay(Duration::from_secs(3));
    let data = m.get_data('1', 0, false).unwrap();
    assert!(data.values.is_empty());
}

#[test]
fn test_pagination() {
    let mut sensor = weather_station('0', 0);
    sensor.io_mut().values = vec![Value::new(1234.567, 3); 6];
    sensor.register_param(0, "X1", "", 3).unwrap();
    sensor.register_param(0, "X2", "", 3).unwrap();
    let mut m = bus(vec![sensor]);

    let r = m
        .start_measurement('0', MeasurementKind::Standard, 0, false)
        .unwrap();
    assert_eq!(r.value_count, 5);

    let mut all = Vec::new();
    for page in 0..10 {
        let data = m.get_data('0', page, false).unwrap();
        if data.values.is_empty() {
            break;
        }
        all.extend_from_slice(&data.values);
    }
    assert_eq!(all, vec![Value::new(1234.567, 3); 5]);
}

#[test]
fn test_metadata() {
    let mut m = bus(vec![weather_station('0', 0)]);
    let r = m
        .identify_measurement('0', "M", MeasurementKind::Standard)
        .unwrap();
    assert_eq!(r.value_count, 3);
    let r = m
        .identify_measurement('0', "C1", MeasurementKind::Concurrent)
        .unwrap();
    assert_eq!(r.value_count, 1);

    let meta = m.identify_param('0', "M", 3).unwrap();
    assert_eq!(meta.shef, "PA");
    assert_eq!(meta.units, "hPa");

    let meta = m.identify_param('0', "MC1", 1).unwrap();
    assert_eq!(meta.units, "m/s");

    assert_eq!(m.identify_param('0', "M", 4), Err(Error::NoData));
}

#[test]
fn test_extended() {
    let mut m = bus(vec![weather_station('1', 0)]);
    let mut out = [0u8; 32];
    let n = m
        .extended('1', "RST", &mut out, Duration::from_millis(100))
        .unwrap();
    assert_eq!(&out[..n], b"1OK\r\n");

    let n = m
        .extended('1', "NOPE", &mut out, Duration::from_millis(100))
        .unwrap();
    assert_eq!(&out[..n], b"1\r\n");

    let r = m
        .extended_multiline('1', "LOG", &mut out, Duration::from_millis(100))
        .unwrap();
    assert_eq!(r.lines, 3);
    assert_eq!(&out[..r.len], b"1L1\r\n1L2\r\n1L3\r\n");
}

#[test]
fn test_high_volume_binary() {
    let mut m = bus(vec![weather_station('0', 0)]);
    let r = m
        .start_measurement('0', MeasurementKind::HighVolumeBinary, 0, false)
        .unwrap();
    assert_eq!(r.value_count, 3);

    let packet = m.get_binary_data('0', 0).unwrap();
    assert_eq!(packet.data_type, BinaryType::I32);
    assert_eq!(packet.payload.len(), 12);
    let values: Vec<f64> = packet.values().collect();
    assert_eq!(values, [2175.0, -350.0, 101300.0]);

    let empty = m.get_binary_data('0', 1).unwrap();
    assert!(empty.payload.is_empty());
    assert_eq!(empty.data_type, BinaryType::Invalid);
    assert_eq!(empty.values().count(), 0);
}

#[test]
fn test_high_volume_ascii() {
    let mut m = bus(vec![weather_station('0', 0)]);
    let r = m
        .start_measurement('0', MeasurementKind::HighVolumeAscii, 0, false)
        .unwrap();
    assert_eq!(r.value_count, 3);

    let mut out = [0u8; 80];
    let n = m.get_hv_data('0', 0, &mut out).unwrap();
    assert_eq!(&out[..n], b"+21.75-3.5+1013");
}
