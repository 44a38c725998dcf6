//! Motion controllers
//!
//! A [`MotionController`] runs scripts and direct motion commands against
//! a stepper device. Two implementations share the contract:
//!
//! - [`StepperController`] drives real firmware (or the simulator) over a
//!   [`Transport`](crate::communication::Transport) using the block
//!   protocol, with back-pressure retries and trigger dispatch.
//! - [`VirtualController`] executes compiled blocks locally without any
//!   device, for dry runs.
//!
//! Each controller runs at most one script at a time. A script is
//! validated, planned, sliced and compiled on the caller's thread; in
//! [`RunMode::Async`] the blocks are then sent from a single background
//! worker thread whose result is collected with
//! [`join`](MotionController::join).

pub mod stepper;
pub mod virtual_controller;

pub use stepper::{SerialController, StepperController};
pub use virtual_controller::VirtualController;

use crate::compiler::{Block, Compiler, Program};
use parking_lot::Mutex;
use std::fmt;
use std::thread::JoinHandle;
use std::time::Duration;
use stepline_core::{
    ConcurrencyError, Error, MachineLimits, ProtocolError, Result, StepScale, ValidationError, V3,
};
use stepline_planner::{Planner, Script, Slicer};

/// How [`MotionController::run`] executes a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Return once the device has finished the script
    Sync,
    /// Return once the script is compiled, executing it in the background
    Async,
}

/// Lifecycle of a script run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// No script is running
    #[default]
    Idle,
    /// A script is being validated, planned and compiled
    Planning,
    /// A compiled program is waiting to be sent
    Ready,
    /// Blocks are being sent and executed
    Executing,
    /// A direct motion command owns the device
    Direct,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "Idle"),
            RunPhase::Planning => write!(f, "Planning"),
            RunPhase::Ready => write!(f, "Ready"),
            RunPhase::Executing => write!(f, "Executing"),
            RunPhase::Direct => write!(f, "Direct"),
        }
    }
}

/// Resend policy for commands refused with a full buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends before giving up
    pub max_retries: u32,
    /// Pause before each resend
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 100,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Settings shared by all controllers
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Kinematic limits
    pub limits: MachineLimits,
    /// Steps per meter
    pub scale: StepScale,
    /// Resampling of planned motion
    pub slicer: Slicer,
    /// Back-pressure handling
    pub retry: RetryPolicy,
    /// Pause between status queries while waiting for the device
    pub poll_interval: Duration,
    /// Consecutive failed status queries tolerated while waiting
    pub max_status_errors: u32,
}

impl ControllerConfig {
    /// Configuration with default timing for the given machine
    pub fn new(limits: MachineLimits, scale: StepScale) -> Self {
        Self {
            limits,
            scale,
            slicer: Slicer::default(),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_millis(200),
            max_status_errors: 5,
        }
    }

    /// Check the limits and that the workspace fits the step counters
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.scale.check_workspace(&self.limits)?;
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(MachineLimits::default(), StepScale::default())
    }
}

/// Counters of the protocol traffic of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    /// Command lines sent, including resends and status queries
    pub commands: u64,
    /// Blocks accepted by the device
    pub blocks_sent: u64,
    /// Backoff pauses after a full-buffer reply
    pub backoffs: u64,
    /// Status queries answered
    pub status_queries: u64,
    /// Trigger callbacks invoked
    pub triggers_fired: u64,
}

/// Target of a direct move; `None` leaves the axis where it is
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveTarget {
    /// X position in meters
    pub x: Option<f64>,
    /// Y position in meters
    pub y: Option<f64>,
    /// Z position in meters
    pub z: Option<f64>,
}

impl MoveTarget {
    /// Move every axis
    pub fn point(p: V3) -> Self {
        Self {
            x: Some(p.x()),
            y: Some(p.y()),
            z: Some(p.z()),
        }
    }

    /// Per-axis targets in wire order
    pub fn axes(&self) -> [Option<f64>; 3] {
        [self.x, self.y, self.z]
    }
}

/// Common contract of stepper controllers
pub trait MotionController: Send + Sync {
    /// Limits enforced by the controller
    fn limits(&self) -> &MachineLimits;

    /// Run `script` from the current position
    fn run(&self, script: &Script, mode: RunMode) -> Result<()>;

    /// Wait for a background run to finish and return its result
    fn join(&self) -> Result<()>;

    /// True while a script runs or the device has blocks left
    fn is_busy(&self) -> Result<bool>;

    /// Current position in meters
    fn get_position(&self) -> Result<V3>;

    /// Move directly to `target` at a relative speed in (0, 1]
    fn moveto(&self, target: MoveTarget, speed: f64) -> Result<()>;

    /// Move at a constant velocity in m/s
    fn moveat(&self, velocity: V3) -> Result<()>;

    /// Execute a single block outside of a script
    fn execute_block(&self, block: &Block) -> Result<()>;
}

/// Plan, slice and compile `script` into `program`
pub(crate) fn compile_script(
    planner: &Planner,
    slicer: &Slicer,
    compiler: &mut Compiler,
    program: &mut Program,
    script: &Script,
    origin: V3,
) -> Result<()> {
    let plan = planner.plan(script, origin)?;
    let sections = slicer.slice(&plan);
    compiler.compile(&sections, program)?;
    tracing::info!(
        "Compiled script: {} segments, {} blocks, {:.3} s of motion",
        plan.segments.len(),
        program.blocks.len(),
        plan.duration()
    );
    Ok(())
}

/// Check a direct move request against the limits
pub(crate) fn validate_moveto(limits: &MachineLimits, target: &MoveTarget, speed: f64) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 || speed > 1.0 {
        tracing::warn!("Rejected direct move with relative speed {}", speed);
        return Err(ValidationError::InvalidSpeed { value: speed }.into());
    }
    for (axis, value) in stepline_core::Axis::ALL.iter().zip(target.axes()) {
        if let Some(value) = value {
            limits.check_axis(*axis, value)?;
        }
    }
    Ok(())
}

/// Absolute step targets of a direct move, keeping unmoved axes at `current`
pub(crate) fn target_steps(scale: &StepScale, target: &MoveTarget, current: [i32; 3]) -> [i32; 3] {
    let mut steps = current;
    for (i, value) in target.axes().iter().enumerate() {
        if let Some(value) = value {
            steps[i] = (value * scale.0[i]).round() as i32;
        }
    }
    steps
}

/// Speed of a direct move in steps per second
///
/// The slowest moved axis sets the pace so no axis exceeds its `vmax`.
pub(crate) fn direct_speed(limits: &MachineLimits, scale: &StepScale, target: &MoveTarget, speed: f64) -> i32 {
    let steps_per_second = target
        .axes()
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_some())
        .map(|(i, _)| scale.0[i].abs() * limits.vmax[i] * speed)
        .fold(f64::INFINITY, f64::min);
    if steps_per_second.is_finite() {
        (steps_per_second.round() as i32).max(1)
    } else {
        0
    }
}

/// Velocity of a move-at command in steps per second, in x, y, z order
pub(crate) fn velocity_steps(scale: &StepScale, velocity: &V3) -> [i32; 3] {
    [
        (velocity.x() * scale.0.x()).round() as i32,
        (velocity.y() * scale.0.y()).round() as i32,
        (velocity.z() * scale.0.z()).round() as i32,
    ]
}

/// Refuse `operation` unless no script is running
pub(crate) fn ensure_idle(phase: RunPhase, operation: &'static str) -> Result<()> {
    if phase != RunPhase::Idle {
        tracing::warn!("Refused {} while the controller is {}", operation, phase);
        return Err(ConcurrencyError::Busy { operation }.into());
    }
    Ok(())
}

/// Claim the controller for one direct command
///
/// The caller must return the phase to [`RunPhase::Idle`] once the command
/// has been exchanged.
pub(crate) fn claim_direct(phase: &mut RunPhase, operation: &'static str) -> Result<()> {
    ensure_idle(*phase, operation)?;
    *phase = RunPhase::Direct;
    Ok(())
}

/// Claim the controller for a new run
pub(crate) fn reserve(phase: &mut RunPhase) -> Result<()> {
    if *phase == RunPhase::Direct {
        tracing::warn!("Refused run while a direct command is in flight");
        return Err(ConcurrencyError::Busy { operation: "run" }.into());
    }
    if *phase != RunPhase::Idle {
        tracing::warn!("Refused run while the controller is {}", phase);
        return Err(ConcurrencyError::AlreadyExecuting.into());
    }
    *phase = RunPhase::Planning;
    Ok(())
}

/// The background thread of a controller
#[derive(Debug, Default)]
pub(crate) struct RunWorker {
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl RunWorker {
    /// Start `job` on a new thread, reaping the previous one
    pub fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut slot = self.handle.lock();
        if let Some(previous) = slot.take() {
            if let Err(e) = wait_for(previous) {
                tracing::warn!("Previous background run failed: {}", e);
            }
        }
        let handle = std::thread::Builder::new()
            .name("stepline-run".to_string())
            .spawn(job)
            .map_err(Error::Io)?;
        *slot = Some(handle);
        Ok(())
    }

    /// Wait for the current thread, if any
    pub fn join(&self) -> Result<()> {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => wait_for(handle),
            None => Ok(()),
        }
    }
}

fn wait_for(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle.join().map_err(|_| {
        tracing::error!("Background run thread panicked");
        Error::from(ProtocolError::WorkerFailed {
            reason: "run thread panicked".to_string(),
        })
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> MachineLimits {
        MachineLimits::new(
            V3::new(0.7, 0.7, 0.4),
            V3::new(0.1, 0.2, 0.01),
            V3::new(1.0, 1.0, 0.1),
        )
    }

    #[test]
    fn test_direct_speed_uses_slowest_moved_axis() {
        let scale = StepScale::new(1000.0, 1000.0, 10000.0);
        let xy = MoveTarget {
            x: Some(0.1),
            y: Some(0.1),
            z: None,
        };
        assert_eq!(direct_speed(&limits(), &scale, &xy, 1.0), 100);
        let z = MoveTarget {
            z: Some(0.1),
            ..MoveTarget::default()
        };
        assert_eq!(direct_speed(&limits(), &scale, &z, 0.5), 50);
        assert_eq!(direct_speed(&limits(), &scale, &MoveTarget::default(), 1.0), 0);
    }

    #[test]
    fn test_target_steps_keeps_unmoved_axes() {
        let scale = StepScale::new(1000.0, 1000.0, 10000.0);
        let target = MoveTarget {
            y: Some(0.25),
            ..MoveTarget::default()
        };
        assert_eq!(target_steps(&scale, &target, [7, 8, 9]), [7, 250, 9]);
    }

    #[test]
    fn test_validate_moveto() {
        let l = limits();
        assert!(validate_moveto(&l, &MoveTarget::point(V3::new(0.1, 0.1, 0.1)), 1.0).is_ok());
        assert!(validate_moveto(&l, &MoveTarget::point(V3::new(0.1, 0.1, 0.1)), 0.0).is_err());
        let out = MoveTarget {
            z: Some(-0.1),
            ..MoveTarget::default()
        };
        assert!(validate_moveto(&l, &out, 1.0).unwrap_err().is_validation_error());
    }

    #[test]
    fn test_reserve_refuses_second_run() {
        let mut phase = RunPhase::Idle;
        reserve(&mut phase).unwrap();
        assert_eq!(phase, RunPhase::Planning);
        assert!(reserve(&mut phase).unwrap_err().is_concurrency_error());
    }

    #[test]
    fn test_direct_command_blocks_run() {
        let mut phase = RunPhase::Idle;
        claim_direct(&mut phase, "moveto").unwrap();
        assert_eq!(phase, RunPhase::Direct);
        assert!(matches!(
            reserve(&mut phase),
            Err(Error::Concurrency(ConcurrencyError::Busy { operation: "run" }))
        ));
        assert!(claim_direct(&mut phase, "moveat").is_err());
        assert_eq!(phase, RunPhase::Direct);
    }
}
