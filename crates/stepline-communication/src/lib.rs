//! # stepline Communication
//!
//! Everything between a sliced plan and the stepper hardware: the block
//! compiler, the line-oriented stepper protocol, serial transport and the
//! motion controllers that run scripts against a device.

pub mod communication;
pub mod compiler;
pub mod controller;
pub mod firmware;

pub use communication::{
    serial::{list_ports, SerialPortInfo, SerialTransport},
    ConnectionParams, SerialParity, Transport,
};

pub use compiler::{Block, Compiler, Program, Trigger, TriggerTable, BLOCK_ID_MODULUS};

pub use controller::{
    ControllerConfig, MotionController, MoveTarget, RetryPolicy, RunMode, RunPhase, RunStats,
    SerialController, StepperController, VirtualController,
};

pub use firmware::{Command, DeviceSimulator, DeviceState, DeviceStatus, Reply};
