//! Stepper reply parsing
//!
//! Every command line gets exactly one reply line:
//! - `OK` when the command was accepted
//! - `RE` when the block buffer is full and the command must be resent
//! - `ERR <message>` when the command was rejected
//! - a JSON status array in answer to a status query

use super::status_parser::DeviceStatus;
use std::fmt;

/// A reply from the firmware
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Command accepted
    Ok,
    /// Buffer full, retry later
    Retry,
    /// Command rejected
    Error(String),
    /// Status report
    Status(DeviceStatus),
}

impl Reply {
    /// Parse one reply line
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line == "OK" {
            Ok(Reply::Ok)
        } else if line == "RE" {
            Ok(Reply::Retry)
        } else if let Some(message) = line.strip_prefix("ERR") {
            Ok(Reply::Error(message.trim().to_string()))
        } else if line.starts_with('[') {
            DeviceStatus::parse(line).map(Reply::Status)
        } else {
            Err(format!("unrecognised reply '{}'", line))
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Retry => write!(f, "RE"),
            Reply::Error(message) if message.is_empty() => write!(f, "ERR"),
            Reply::Error(message) => write!(f, "ERR {}", message),
            Reply::Status(status) => write!(f, "{}", status.to_reply()),
        }
    }
}
