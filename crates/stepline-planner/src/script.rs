//! Script building
//!
//! A [`Script`] is an immutable, ordered list of [`Action`]s plus the
//! corner deviation tolerance the planner may use when blending moves.
//! Scripts are assembled with a [`ScriptBuilder`]:
//!
//! ```
//! use stepline_planner::ScriptBuilder;
//!
//! let mut builder = ScriptBuilder::new();
//! builder.begin(0.01).unwrap();
//! builder.moveto(0.1, 0.0, 0.0, 0.5).unwrap();
//! builder.delay(0.5).unwrap();
//! builder.moveto(0.1, 0.1, 0.0, 1.0).unwrap();
//! let script = builder.end().unwrap();
//! assert_eq!(script.count_moves(), 2);
//! ```

use crate::action::{Action, TriggerEvent};
use std::sync::Arc;
use stepline_core::{ConcurrencyError, MachineLimits, Result, ValidationError, V3};

/// A waypoint produced by an external path planner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// Target position in meters
    pub p: V3,
    /// Relative speed in (0, 1]
    pub speed: f64,
}

impl Waypoint {
    /// Create a waypoint
    pub fn new(x: f64, y: f64, z: f64, speed: f64) -> Self {
        Self {
            p: V3::new(x, y, z),
            speed,
        }
    }
}

/// An immutable sequence of actions
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    actions: Vec<Action>,
    deviation: f64,
}

impl Script {
    /// Build a script that visits every waypoint in order
    pub fn from_waypoints(deviation: f64, waypoints: &[Waypoint]) -> Result<Script> {
        let mut builder = ScriptBuilder::new();
        builder.begin(deviation)?;
        for w in waypoints {
            builder.moveto(w.p.x(), w.p.y(), w.p.z(), w.speed)?;
        }
        builder.end()
    }

    /// Actions in execution order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Maximum corner deviation in meters
    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    /// Number of move actions
    pub fn count_moves(&self) -> usize {
        self.actions.iter().filter(|a| a.is_motion()).count()
    }

    /// True when the script holds no actions
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Check every move target against the machine's position ranges
    pub fn validate(&self, limits: &MachineLimits) -> std::result::Result<(), ValidationError> {
        for (index, action) in self.actions.iter().enumerate() {
            if let Action::Move { p, .. } = action {
                limits.check_position(p).inspect_err(|e| {
                    tracing::warn!("Script action {} rejected: {}", index, e);
                })?;
            }
        }
        Ok(())
    }
}

/// Incrementally assembles a [`Script`]
///
/// Only one script can be pending at a time: calling
/// [`begin`](ScriptBuilder::begin) twice without an intervening
/// [`end`](ScriptBuilder::end) fails with
/// [`ConcurrencyError::ScriptPending`].
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    pending: Option<Script>,
}

impl ScriptBuilder {
    /// Create a builder with no pending script
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a script is being built
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a new script with the given corner deviation tolerance
    pub fn begin(&mut self, deviation: f64) -> Result<&mut Self> {
        if self.pending.is_some() {
            tracing::warn!("begin() called while a script is pending");
            return Err(ConcurrencyError::ScriptPending.into());
        }
        if !deviation.is_finite() || deviation <= 0.0 {
            tracing::warn!("Rejected deviation tolerance {}", deviation);
            return Err(ValidationError::InvalidDeviation { value: deviation }.into());
        }
        self.pending = Some(Script {
            actions: Vec::new(),
            deviation,
        });
        Ok(self)
    }

    /// Append a straight move to `(x, y, z)` at a relative speed in (0, 1]
    pub fn moveto(&mut self, x: f64, y: f64, z: f64, speed: f64) -> Result<&mut Self> {
        let p = V3::new(x, y, z);
        for (axis, value) in p.iter() {
            if !value.is_finite() {
                tracing::warn!("Rejected move with non-finite {} = {}", axis, value);
                return Err(ValidationError::InvalidPosition { axis, value }.into());
            }
        }
        if !speed.is_finite() || speed <= 0.0 || speed > 1.0 {
            tracing::warn!("Rejected move to {} with relative speed {}", p, speed);
            return Err(ValidationError::InvalidSpeed { value: speed }.into());
        }
        self.push(Action::Move { p, speed })
    }

    /// Append a pause of `seconds`
    pub fn delay(&mut self, seconds: f64) -> Result<&mut Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            tracing::warn!("Rejected delay of {} s", seconds);
            return Err(ValidationError::InvalidDelay { seconds }.into());
        }
        self.push(Action::Delay { seconds })
    }

    /// Append a trigger that invokes `callback` when the device reaches it
    pub fn trigger<F>(&mut self, callback: F, arg: i16) -> Result<&mut Self>
    where
        F: Fn(TriggerEvent) + Send + Sync + 'static,
    {
        self.push(Action::Trigger {
            callback: Arc::new(callback),
            arg,
        })
    }

    /// Append a wait for all buffered motion to finish
    pub fn wait(&mut self) -> Result<&mut Self> {
        self.push(Action::Wait)
    }

    /// Finish the pending script
    pub fn end(&mut self) -> Result<Script> {
        self.pending
            .take()
            .ok_or_else(|| ValidationError::NoScriptPending.into())
    }

    fn push(&mut self, action: Action) -> Result<&mut Self> {
        match self.pending.as_mut() {
            Some(script) => {
                script.actions.push(action);
                Ok(self)
            }
            None => {
                tracing::warn!("{} appended without a pending script", action.name());
                Err(ValidationError::NoScriptPending.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepline_core::{Axis, Error};

    #[test]
    fn test_second_begin_fails() {
        let mut builder = ScriptBuilder::new();
        builder.begin(0.01).unwrap();
        let err = builder.begin(0.01).unwrap_err();
        assert!(matches!(
            err,
            Error::Concurrency(ConcurrencyError::ScriptPending)
        ));
        // the first script is still intact
        builder.moveto(0.1, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(builder.end().unwrap().count_moves(), 1);
    }

    #[test]
    fn test_begin_after_end_succeeds() {
        let mut builder = ScriptBuilder::new();
        builder.begin(0.01).unwrap();
        builder.end().unwrap();
        assert!(builder.begin(0.02).is_ok());
    }

    #[test]
    fn test_speed_bounds() {
        let mut builder = ScriptBuilder::new();
        builder.begin(0.01).unwrap();
        for speed in [0.0, -0.5, 1.5, f64::NAN] {
            let err = builder.moveto(0.1, 0.0, 0.0, speed).unwrap_err();
            assert!(err.is_validation_error(), "speed {speed} accepted");
        }
        assert!(builder.moveto(0.1, 0.0, 0.0, 1.0).is_ok());
    }

    #[test]
    fn test_append_without_begin() {
        let mut builder = ScriptBuilder::new();
        assert!(matches!(
            builder.wait().unwrap_err(),
            Error::Validation(ValidationError::NoScriptPending)
        ));
        assert!(builder.end().is_err());
    }

    #[test]
    fn test_invalid_deviation_and_delay() {
        let mut builder = ScriptBuilder::new();
        assert!(builder.begin(0.0).is_err());
        assert!(!builder.is_pending());
        builder.begin(0.001).unwrap();
        assert!(builder.delay(-1.0).is_err());
        assert!(builder.delay(0.0).is_ok());
    }

    #[test]
    fn test_validate_reports_axis() {
        let script = Script::from_waypoints(
            0.01,
            &[Waypoint::new(0.1, 0.1, 0.0, 1.0), Waypoint::new(0.1, 0.9, 0.0, 1.0)],
        )
        .unwrap();
        let err = script.validate(&MachineLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::PositionOutOfRange { axis: Axis::Y, .. }
        ));
    }
}
