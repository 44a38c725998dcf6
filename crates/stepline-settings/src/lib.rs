//! stepline Settings Crate
//!
//! Machine, motion, connection and protocol configuration with JSON/TOML
//! persistence.

pub mod config;
pub mod error;
pub mod stepper;

pub use config::{Config, ConnectionSettings, MachineSettings, MotionSettings, ProtocolSettings};
pub use error::{SettingsError, SettingsResult};
pub use stepper::StepperSettings;
