//! Constant-acceleration sections
//!
//! A [`Section`] is the basic unit of planned motion: starting at absolute
//! time `at` from position `p0` with velocity `v0`, the tool accelerates at
//! a constant `a` for `t` seconds. The end state follows analytically:
//!
//! - `v1 = v0 + a·t`
//! - `d = p1 − p0 = v0·t + a·t²/2`
//!
//! Sections of zero duration carry the non-motion actions of a script
//! (waits, delays and triggers) at the point where they occur.

use crate::action::Action;
use stepline_core::{MachineLimits, V3};

/// Tolerances used when checking a section against the machine limits
const POSITION_TOLERANCE: f64 = 0.001;
const VELOCITY_TOLERANCE: f64 = 0.01;
const ACCELERATION_TOLERANCE: f64 = 0.001;

/// A piece of motion under constant acceleration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    /// Duration in seconds
    pub t: f64,
    /// Absolute start time in seconds
    pub at: f64,
    /// Start position
    pub p0: V3,
    /// End position
    pub p1: V3,
    /// Start velocity
    pub v0: V3,
    /// End velocity
    pub v1: V3,
    /// Constant acceleration
    pub a: V3,
    /// Displacement `p1 - p0`
    pub d: V3,
    /// Non-motion actions executed at this point
    pub actions: Vec<Action>,
}

impl Section {
    /// Motion starting at `p0` with velocity `v0` under acceleration `a`
    pub fn from_motion(p0: V3, v0: V3, a: V3, t: f64, at: f64) -> Self {
        let d = v0 * t + a * (t * t / 2.0);
        Self {
            t,
            at,
            p0,
            p1: p0 + d,
            v0,
            v1: v0 + a * t,
            a,
            d,
            actions: Vec::new(),
        }
    }

    /// A zero-duration section standing still at `p`
    pub fn rest(p: V3, at: f64) -> Self {
        Self {
            at,
            p0: p,
            p1: p,
            ..Self::default()
        }
    }

    /// A zero-duration section holding a non-motion action
    pub fn with_action(p: V3, at: f64, action: Action) -> Self {
        Self {
            actions: vec![action],
            ..Self::rest(p, at)
        }
    }

    /// True when the section moves the tool
    pub fn is_motion(&self) -> bool {
        self.t > 0.0
    }

    /// Absolute end time
    pub fn end_time(&self) -> f64 {
        self.at + self.t
    }

    /// Position `dt` seconds after the start
    pub fn position_at(&self, dt: f64) -> V3 {
        self.p0 + self.v0 * dt + self.a * (dt * dt / 2.0)
    }

    /// Velocity `dt` seconds after the start
    pub fn velocity_at(&self, dt: f64) -> V3 {
        self.v0 + self.a * dt
    }

    /// Path length travelled during the section
    pub fn length(&self) -> f64 {
        self.d.norm()
    }

    /// The part of this section between relative times `t0` and `t1`
    pub fn between(&self, t0: f64, t1: f64) -> Section {
        let p0 = if t0 <= 0.0 { self.p0 } else { self.position_at(t0) };
        let p1 = if t1 >= self.t { self.p1 } else { self.position_at(t1) };
        Section {
            t: t1 - t0,
            at: self.at + t0,
            p0,
            p1,
            v0: self.velocity_at(t0),
            v1: self.velocity_at(t1),
            a: self.a,
            d: p1 - p0,
            actions: Vec::new(),
        }
    }

    /// Cut the section into consecutive pieces of at most `period` seconds
    ///
    /// Every piece except possibly the last lasts exactly `period`. Piece
    /// boundaries are evaluated from the analytic kinematics, so adjacent
    /// pieces share their end points exactly.
    pub fn slice(&self, period: f64) -> Vec<Section> {
        if self.t <= 0.0 || period <= 0.0 {
            return Vec::new();
        }
        let count = ((self.t / period) - 1e-9).ceil().max(1.0) as usize;
        (0..count)
            .map(|k| {
                let t0 = k as f64 * period;
                let t1 = if k + 1 == count {
                    self.t
                } else {
                    (k + 1) as f64 * period
                };
                self.between(t0, t1)
            })
            .collect()
    }

    /// Check the section against the machine limits
    ///
    /// Returns a description of the first failed check.
    pub fn check(&self, limits: &MachineLimits) -> Result<(), String> {
        if !self.t.is_finite() || self.t < 0.0 {
            return Err(format!("invalid duration {}", self.t));
        }
        for (name, v) in [
            ("p0", &self.p0),
            ("p1", &self.p1),
            ("v0", &self.v0),
            ("v1", &self.v1),
            ("a", &self.a),
        ] {
            if !v.is_finite() {
                return Err(format!("{} is not finite: {}", name, v));
            }
        }
        for (name, p) in [("p0", &self.p0), ("p1", &self.p1)] {
            if !limits.contains(p, POSITION_TOLERANCE) {
                return Err(format!("{} {} outside the workspace", name, p));
            }
        }
        for (axis, max) in limits.vmax.iter() {
            let v = self.v0[axis].abs().max(self.v1[axis].abs());
            if v > max + VELOCITY_TOLERANCE {
                return Err(format!("speed {} on {} exceeds {}", v, axis, max));
            }
        }
        for (axis, max) in limits.amax.iter() {
            if self.a[axis].abs() > max + ACCELERATION_TOLERANCE {
                return Err(format!(
                    "acceleration {} on {} exceeds {}",
                    self.a[axis], axis, max
                ));
            }
        }
        Ok(())
    }
}
