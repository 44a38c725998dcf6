//! Line transports
//!
//! The stepper protocol is strictly request/response: the host writes one
//! command line and reads exactly one reply line. [`Transport`] captures
//! that round trip so controllers can run over a serial port, the
//! in-memory device simulator, or a test double.

pub mod serial;

use serde::{Deserialize, Serialize};
use stepline_core::Result;

/// One command line out, one reply line back
pub trait Transport: Send {
    /// Send `line` and return the reply without its line terminator
    fn exchange(&mut self, line: &str) -> Result<String>;

    /// Human-readable name of the transport
    fn name(&self) -> String {
        "transport".to_string()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, line: &str) -> Result<String> {
        (**self).exchange(line)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a serial connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name (e.g. "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Time to wait for a reply line in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionParams {
    /// Default parameters for `port`
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the reply timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 1000,
        }
    }
}
