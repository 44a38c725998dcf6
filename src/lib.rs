//! # stepline
//!
//! Trajectory planning and block streaming for three-axis stepper CNC arms:
//! - Scripts of straight moves, waits, delays and host triggers
//! - Time-optimal planning with blended corners inside a deviation tolerance
//! - Fixed-period slicing and compilation into 16-bit firmware blocks
//! - Streaming over serial with back-pressure and trigger dispatch
//!
//! ## Architecture
//!
//! stepline is organized as a workspace with multiple crates:
//!
//! 1. **stepline-core** - Vector math, machine limits, step scaling, errors
//! 2. **stepline-planner** - Script builder, planner, ATDC profiles, slicer
//! 3. **stepline-communication** - Block compiler, stepper protocol, controllers
//! 4. **stepline-settings** - Configuration files
//! 5. **stepline** - This crate, which wires configuration to controllers

pub use stepline_communication::{
    list_ports, Block, Command, Compiler, ConnectionParams, ControllerConfig, DeviceSimulator,
    DeviceState, DeviceStatus, MotionController, MoveTarget, Program, Reply, RetryPolicy, RunMode,
    RunPhase, RunStats, SerialController, SerialPortInfo, StepperController, Transport,
    VirtualController,
};

pub use stepline_core::{
    Axis, CompileError, ConcurrencyError, Error, MachineLimits, ProtocolError, Result, StepScale,
    ValidationError, V3,
};

pub use stepline_planner::{
    Action, Atdc, Plan, Planner, Script, ScriptBuilder, Section, Segment, Slicer, TriggerEvent,
    Waypoint,
};

pub use stepline_settings::{
    Config, ConnectionSettings, MachineSettings, MotionSettings, ProtocolSettings, SettingsError,
    StepperSettings,
};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Controller settings described by `config`
pub fn controller_config(config: &Config) -> Result<ControllerConfig> {
    config.validate()?;
    let protocol = &config.protocol;
    Ok(ControllerConfig {
        limits: config.machine.limits(),
        scale: config.machine.step_scale(),
        slicer: Slicer::new(config.motion.period, config.motion.max_slice_duration)?,
        retry: RetryPolicy {
            max_retries: protocol.max_retries,
            backoff: Duration::from_millis(protocol.backoff_ms),
        },
        poll_interval: Duration::from_millis(protocol.poll_interval_ms),
        max_status_errors: protocol.max_status_errors,
    })
}

/// Serial parameters described by `config`
pub fn connection_params(config: &Config) -> ConnectionParams {
    ConnectionParams::new(config.connection.port.clone())
        .with_baud_rate(config.connection.baud_rate)
        .with_timeout_ms(config.connection.timeout_ms)
}

/// Open the serial controller described by `config`
pub fn open_controller(config: &Config) -> Result<SerialController> {
    let controller_config = controller_config(config)?;
    StepperController::open(&connection_params(config), controller_config)
}

/// A device-free controller for the machine described by `config`
pub fn virtual_controller(config: &Config) -> Result<VirtualController> {
    VirtualController::new(controller_config(config)?)
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
/// - Thread names, since scripts can run on a background thread
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
