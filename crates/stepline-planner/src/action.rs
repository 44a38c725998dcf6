//! Script actions
//!
//! An [`Action`] is one step of a script: a straight move, a wait for the
//! buffered motion to finish, a timed pause, or a trigger that calls back
//! into the host while the device is paused.

use std::fmt;
use std::sync::Arc;
use stepline_core::V3;

/// Payload handed to a trigger callback when the device reports it fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Trigger id assigned at compile time
    pub id: i16,
    /// Argument given when the trigger was added to the script
    pub arg: i16,
}

/// Callback invoked when a trigger fires
///
/// Any user data the callback needs is captured by the closure.
pub type TriggerCallback = Arc<dyn Fn(TriggerEvent) + Send + Sync>;

/// One step of a script
#[derive(Clone)]
pub enum Action {
    /// Wait until all buffered motion has completed
    Wait,
    /// Move in a straight line to `p` at a fraction of the maximum speed
    Move {
        /// Target position in meters
        p: V3,
        /// Relative speed in (0, 1]
        speed: f64,
    },
    /// Pause for a number of seconds
    Delay {
        /// Duration in seconds
        seconds: f64,
    },
    /// Stop and call back into the host
    Trigger {
        /// Callback to invoke
        callback: TriggerCallback,
        /// Argument sent to the device and returned to the callback
        arg: i16,
    },
}

impl Action {
    /// True for [`Action::Move`]
    pub fn is_motion(&self) -> bool {
        matches!(self, Action::Move { .. })
    }

    /// Short name used in log messages
    pub fn name(&self) -> &'static str {
        match self {
            Action::Wait => "wait",
            Action::Move { .. } => "move",
            Action::Delay { .. } => "delay",
            Action::Trigger { .. } => "trigger",
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Wait => write!(f, "Wait"),
            Action::Move { p, speed } => f
                .debug_struct("Move")
                .field("p", p)
                .field("speed", speed)
                .finish(),
            Action::Delay { seconds } => f.debug_struct("Delay").field("seconds", seconds).finish(),
            Action::Trigger { arg, .. } => f
                .debug_struct("Trigger")
                .field("arg", arg)
                .finish_non_exhaustive(),
        }
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Action::Wait, Action::Wait) => true,
            (Action::Move { p: a, speed: s }, Action::Move { p: b, speed: t }) => a == b && s == t,
            (Action::Delay { seconds: a }, Action::Delay { seconds: b }) => a == b,
            (
                Action::Trigger { callback: a, arg: x },
                Action::Trigger { callback: b, arg: y },
            ) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)) && x == y,
            _ => false,
        }
    }
}
