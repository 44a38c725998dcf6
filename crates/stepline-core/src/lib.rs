//! # stepline Core
//!
//! Core types shared by every stepline crate: the three-axis vector
//! type, machine limits and step scaling, and the error taxonomy used
//! throughout the motion pipeline.

pub mod error;
pub mod limits;
pub mod vector;

pub use error::{CompileError, ConcurrencyError, Error, ProtocolError, Result, ValidationError};
pub use limits::{MachineLimits, StepScale, MAX_WIRE_VALUE};
pub use vector::{Axis, V3, AXES};
