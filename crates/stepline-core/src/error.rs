//! Error handling for stepline
//!
//! Provides error types for every stage of the motion pipeline:
//! - Validation errors (scripts, limits, direct motion requests)
//! - Compile errors (plans that cannot be turned into wire blocks)
//! - Protocol errors (device replies, transport failures)
//! - Concurrency errors (overlapping scripts and runs)
//!
//! All error types use `thiserror` for ergonomic error handling.

use crate::vector::Axis;
use thiserror::Error;

/// Validation error type
///
/// Raised before any device I/O when a request falls outside the
/// machine's limits or a script is used in the wrong state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A position lies outside the axis range
    #[error("Position {value} on {axis} outside range [{min}, {max}]")]
    PositionOutOfRange {
        /// The offending axis.
        axis: Axis,
        /// The requested position in meters.
        value: f64,
        /// Lower bound of the axis range.
        min: f64,
        /// Upper bound of the axis range.
        max: f64,
    },

    /// A coordinate is NaN or infinite
    #[error("Invalid position on {axis}: {value}")]
    InvalidPosition {
        /// The offending axis.
        axis: Axis,
        /// The non-finite value.
        value: f64,
    },

    /// A relative speed outside (0, 1]
    #[error("Invalid relative speed {value}, expected a value in (0, 1]")]
    InvalidSpeed {
        /// The requested speed fraction.
        value: f64,
    },

    /// A velocity component above the axis maximum
    #[error("Velocity {value} m/s on {axis} exceeds maximum {max} m/s")]
    VelocityOutOfRange {
        /// The offending axis.
        axis: Axis,
        /// The requested velocity.
        value: f64,
        /// The axis maximum.
        max: f64,
    },

    /// A negative or non-finite delay
    #[error("Invalid delay of {seconds} s")]
    InvalidDelay {
        /// The requested duration in seconds.
        seconds: f64,
    },

    /// A non-positive or non-finite deviation tolerance
    #[error("Invalid deviation tolerance {value} m")]
    InvalidDeviation {
        /// The requested tolerance.
        value: f64,
    },

    /// The machine limits themselves are unusable
    #[error("Invalid limits on {axis}: {reason}")]
    InvalidLimits {
        /// The offending axis.
        axis: Axis,
        /// What is wrong with the limit.
        reason: String,
    },

    /// The workspace does not fit the firmware's 16-bit step counters
    #[error("Workspace on {axis} spans {steps} steps, the firmware supports at most {max}")]
    WorkspaceTooLarge {
        /// The offending axis.
        axis: Axis,
        /// Steps needed to reach the end of the axis.
        steps: f64,
        /// Largest reachable step count.
        max: i32,
    },

    /// Slicing parameters are unusable
    #[error("Invalid slicing parameter {name}: {value}")]
    InvalidSlicing {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// An action was appended without a pending script
    #[error("No script is being built, call begin() first")]
    NoScriptPending,
}

/// Compile error type
///
/// Represents plans or section lists that cannot be expressed as
/// 16-bit wire blocks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The planned trajectory breaks a kinematic limit
    #[error("Invalid plan: {reason}")]
    InvalidPlan {
        /// What check failed and where.
        reason: String,
    },

    /// A step delta does not fit a signed 16-bit field
    #[error("Step delta {steps} on {axis} does not fit a block")]
    StepOverflow {
        /// The offending axis.
        axis: Axis,
        /// The delta that overflowed.
        steps: i64,
    },

    /// A block duration does not fit a signed 16-bit field
    #[error("Block duration {ms} ms does not fit a block")]
    DurationOverflow {
        /// The offending duration.
        ms: i64,
    },

    /// Too many triggers for 16-bit ids
    #[error("Trigger table overflow at {count} entries")]
    TriggerOverflow {
        /// Number of triggers already registered.
        count: usize,
    },
}

/// Protocol error type
///
/// Represents failures talking to the stepper firmware.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The device answered with `ERR`
    #[error("Device error on '{command}': {message}")]
    DeviceError {
        /// The command that was rejected.
        command: String,
        /// The message reported by the firmware.
        message: String,
    },

    /// The device answered something unparsable
    #[error("Malformed reply to '{command}': {reply}")]
    MalformedReply {
        /// The command that was sent.
        command: String,
        /// The raw reply.
        reply: String,
    },

    /// The device kept answering `RE`
    #[error("Device buffer still full after {retries} retries of '{command}'")]
    RetriesExhausted {
        /// The command that could not be delivered.
        command: String,
        /// Number of retries performed.
        retries: u32,
    },

    /// The device did not become idle
    #[error("Gave up waiting for the device after {errors} failed status queries")]
    WaitFailed {
        /// Number of consecutive failures.
        errors: u32,
    },

    /// The line transport failed
    #[error("Transport error: {reason}")]
    Transport {
        /// The underlying failure.
        reason: String,
    },

    /// The background run thread died
    #[error("Run worker failed: {reason}")]
    WorkerFailed {
        /// Why the worker failed.
        reason: String,
    },
}

/// Concurrency error type
///
/// Raised when a request overlaps with a script or run that is still
/// active. Always raised before any device I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// `begin` was called while another script is being built
    #[error("A script is already being built")]
    ScriptPending,

    /// A run was requested while another one executes
    #[error("A script is already executing")]
    AlreadyExecuting,

    /// Direct motion was requested while a script executes
    #[error("Cannot {operation} while a script is executing")]
    Busy {
        /// The refused operation.
        operation: &'static str,
    },
}

/// Main error type for stepline
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Compile error
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Concurrency error
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this is a compile error
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Error::Compile(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a concurrency error
    pub fn is_concurrency_error(&self) -> bool {
        matches!(self, Error::Concurrency(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
