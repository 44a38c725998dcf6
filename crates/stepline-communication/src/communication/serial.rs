//! Serial line transport
//!
//! Talks to the stepper firmware over USB serial. Each exchange writes one
//! `\n`-terminated command and reads bytes until the reply's line
//! terminator arrives or the reply timeout expires.

use super::{ConnectionParams, SerialParity, Transport};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use stepline_core::{Error, ProtocolError, Result};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g. "/dev/ttyACM0", "COM3")
    pub port_name: String,
    /// Port description (e.g. "USB Arduino Serial Port")
    pub description: String,
    /// USB vendor and product ids if applicable
    pub usb_ids: Option<(u16, u16)>,
}

/// List the serial ports a stepper controller board may be attached to
///
/// Only USB-style ports are reported:
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .into_iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| {
            let (description, usb_ids) = match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => (
                    format!(
                        "USB {} {}",
                        usb.manufacturer.as_deref().unwrap_or("Device"),
                        usb.product.as_deref().unwrap_or("Serial Port")
                    ),
                    Some((usb.vid, usb.pid)),
                ),
                serialport::SerialPortType::BluetoothPort => ("Bluetooth Serial".to_string(), None),
                serialport::SerialPortType::PciPort => ("PCI Serial".to_string(), None),
                serialport::SerialPortType::Unknown => ("Serial Port".to_string(), None),
            };
            SerialPortInfo {
                port_name: port.port_name,
                description,
                usb_ids,
            }
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    ["/dev/ttyUSB", "/dev/ttyACM", "/dev/cu.usbserial-", "/dev/cu.usbmodem"]
        .iter()
        .any(|prefix| port_name.starts_with(prefix))
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Byte stream a [`SerialTransport`] runs on
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

/// Line transport over a serial port
pub struct SerialTransport {
    name: String,
    port: Box<dyn ReadWrite>,
    timeout: Duration,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open the serial port described by `params`
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(Error::other(format!("Invalid data bits: {}", other))),
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => return Err(Error::other(format!("Invalid stop bits: {}", other))),
        };

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(10))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open_native()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Error::other(format!("Failed to open port {}: {}", params.port, e))
            })?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
        Ok(Self::from_stream(
            params.port.clone(),
            port,
            Duration::from_millis(params.timeout_ms),
        ))
    }

    /// Run the line protocol over an already open byte stream
    pub fn from_stream(name: impl Into<String>, stream: impl ReadWrite + 'static, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            port: Box::new(stream),
            timeout,
            pending: Vec::new(),
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 64];
        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                return Ok(line.to_string());
            }
            if Instant::now() >= deadline {
                tracing::warn!("No reply from {} within {:?}", self.name, self.timeout);
                return Err(ProtocolError::Transport {
                    reason: format!("no reply from {} within {:?}", self.name, self.timeout),
                }
                .into());
            }
            match self.port.read(&mut buf) {
                Ok(0) => std::thread::sleep(Duration::from_millis(1)),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!("Read from {} failed: {}", self.name, e);
                    return Err(ProtocolError::Transport {
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
    }
}

impl Transport for SerialTransport {
    fn exchange(&mut self, line: &str) -> Result<String> {
        let mut out = Vec::with_capacity(line.len() + 1);
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
        self.port
            .write_all(&out)
            .and_then(|_| self.port.flush())
            .map_err(|e| {
                tracing::error!("Write of '{}' to {} failed: {}", line, self.name, e);
                ProtocolError::Transport {
                    reason: e.to_string(),
                }
            })?;
        self.read_line()
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Echoes a canned reply for every line written
    struct Loopback {
        written: Vec<u8>,
        replies: VecDeque<&'static [u8]>,
        readable: VecDeque<u8>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.readable.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
            }
            // deliver one byte at a time to exercise reassembly
            buf[0] = self.readable.pop_front().unwrap();
            Ok(1)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(data);
            if data.ends_with(b"\n") {
                if let Some(reply) = self.replies.pop_front() {
                    self.readable.extend(reply.iter().copied());
                }
            }
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn loopback(replies: &[&'static [u8]]) -> SerialTransport {
        SerialTransport::from_stream(
            "loopback",
            Loopback {
                written: Vec::new(),
                replies: replies.iter().copied().collect(),
                readable: VecDeque::new(),
            },
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_exchange_reads_one_line() {
        let mut transport = loopback(&[b"OK\r\n", b"\nRE\n"]);
        assert_eq!(transport.exchange("W").unwrap(), "OK");
        assert_eq!(transport.exchange("D10").unwrap(), "RE");
    }

    #[test]
    fn test_exchange_times_out() {
        let mut transport = loopback(&[]);
        let err = transport.exchange("S").unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_controller_port_names() {
        assert!(is_controller_port("COM3"));
        assert!(is_controller_port("/dev/ttyACM0"));
        assert!(is_controller_port("/dev/cu.usbmodem1421"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("/dev/ttyS0"));
    }
}
