//! Stepper firmware protocol
//!
//! Encoding of commands, parsing of replies and status reports, and an
//! in-memory model of the firmware for tests and dry runs.

pub mod protocol;
pub mod response_parser;
pub mod simulator;
pub mod status_parser;

pub use protocol::Command;
pub use response_parser::Reply;
pub use simulator::{DeviceSimulator, SimulatorHandle, SimulatorState, DEFAULT_CAPACITY};
pub use status_parser::{DeviceState, DeviceStatus};
