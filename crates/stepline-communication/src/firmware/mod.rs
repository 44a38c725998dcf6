//! Firmware protocols
//!
//! Only the stepper firmware protocol is implemented: a buffered block
//! interface with status polling and triggers.

pub mod stepper;

pub use stepper::{Command, DeviceSimulator, DeviceState, DeviceStatus, Reply};
