use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use sdi12::master::{Master, MasterIo};
use sdi12::timing::{BAUD_RATE, BREAK, MARKING_TIMEOUT};
use sdi12::types::{Direction, MeasurementKind};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

const PORT_NAME: &'static str = "/dev/ttyUSB0";

/// RS-485 style adapter, RTS drives the transmitter
struct SerialBus {
    port: Box<dyn SerialPort>,
}

impl MasterIo for SerialBus {
    fn send(&mut self, data: &[u8]) {
        let _ = self.port.clear(ClearBuffer::Input);
        if let Err(e) = self.port.write_all(data).and_then(|_| self.port.flush()) {
            eprintln!("write failed: {}", e);
        }
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        let mut n = 0;
        let _ = self.port.set_timeout(timeout);
        while n < buf.len() {
            match self.port.read(&mut buf[n..n + 1]) {
                Ok(0) => break,
                Ok(_) => {
                    n += 1;
                    if buf[n - 1] == b'\n' {
                        break;
                    }
                    // later bytes may trail by up to a marking period on USB adapters
                    let _ = self.port.set_timeout(MARKING_TIMEOUT);
                }
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => {
                    eprintln!("read failed: {}", e);
                    break;
                }
            }
        }
        n
    }

    fn set_direction(&mut self, direction: Direction) {
        let _ = self
            .port
            .write_request_to_send(direction == Direction::Tx);
    }

    fn send_break(&mut self) {
        let _ = self.port.set_break();
        thread::sleep(BREAK);
        let _ = self.port.clear_break();
    }

    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

fn main() {
    let port = serialport::new(PORT_NAME, BAUD_RATE)
        .data_bits(DataBits::Seven)
        .parity(Parity::Even)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(100))
        .open();

    let port = match port {
        Ok(port) => port,
        Err(e) => {
            eprintln!("Failed to open \"{}\". Error: {}", PORT_NAME, e);
            ::std::process::exit(1);
        }
    };

    let mut master = Master::new(SerialBus { port });
    master.send_break();

    let addresses = ('0'..='9').chain('A'..='Z').chain('a'..='z');
    for address in addresses {
        match master.acknowledge(address) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                eprintln!("{}: {}", address, e);
                continue;
            }
        }

        match master.identify(address) {
            Ok(ident) => println!(
                "{}: {} {} fw {} serial {}",
                address,
                ident.info.vendor,
                ident.info.model,
                ident.info.firmware_version,
                ident.info.serial
            ),
            Err(e) => eprintln!("{}: identify failed: {}", address, e),
        }

        let measurement =
            match master.start_measurement(address, MeasurementKind::Standard, 0, true) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("{}: measurement failed: {}", address, e);
                    continue;
                }
            };
        if measurement.wait_seconds > 0 {
            let timeout = master.timing().service_request_timeout(measurement.wait_seconds);
            if let Err(e) = master.wait_service_request(address, timeout) {
                eprintln!("{}: no service request: {}", address, e);
            }
        }

        let mut received = 0;
        for page in 0..sdi12::MAX_DATA_PAGES {
            if received >= usize::from(measurement.value_count) {
                break;
            }
            match master.get_data(address, page, true) {
                Ok(data) if data.values.is_empty() => break,
                Ok(data) => {
                    received += data.values.len();
                    println!("{}: D{} {:?}", address, page, data.values);
                }
                Err(e) => {
                    eprintln!("{}: D{} failed: {}", address, page, e);
                    break;
                }
            }
        }
    }
}
