//! Machine limits and step scaling
//!
//! [`MachineLimits`] bounds every position, velocity and acceleration the
//! planner is allowed to produce. The sign of each `xmax` component gives
//! the direction of the axis: the valid range is `[0, xmax]` when `xmax`
//! is positive and `[xmax, 0]` otherwise.
//!
//! [`StepScale`] converts meters into the signed step counts used on the
//! wire.

use crate::error::ValidationError;
use crate::vector::{Axis, V3};
use serde::{Deserialize, Serialize};

/// Largest step count or duration that fits a signed 16-bit wire field
pub const MAX_WIRE_VALUE: i32 = i16::MAX as i32;

/// Per-axis kinematic bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineLimits {
    /// Signed end of each axis in meters
    pub xmax: V3,
    /// Maximum speed of each axis in m/s
    pub vmax: V3,
    /// Maximum acceleration of each axis in m/s²
    pub amax: V3,
}

impl MachineLimits {
    /// Create limits from their components
    pub fn new(xmax: V3, vmax: V3, amax: V3) -> Self {
        Self { xmax, vmax, amax }
    }

    /// Check that every bound is usable
    pub fn validate(&self) -> Result<(), ValidationError> {
        for axis in Axis::ALL {
            let i = axis.index();
            if !self.xmax[i].is_finite() || self.xmax[i] == 0.0 {
                return Err(invalid(axis, format!("xmax must be finite and non-zero, got {}", self.xmax[i])));
            }
            if !self.vmax[i].is_finite() || self.vmax[i] <= 0.0 {
                return Err(invalid(axis, format!("vmax must be > 0, got {}", self.vmax[i])));
            }
            if !self.amax[i].is_finite() || self.amax[i] <= 0.0 {
                return Err(invalid(axis, format!("amax must be > 0, got {}", self.amax[i])));
            }
        }
        Ok(())
    }

    /// Valid `(min, max)` range of an axis
    pub fn range(&self, axis: Axis) -> (f64, f64) {
        let xmax = self.xmax[axis];
        if xmax >= 0.0 {
            (0.0, xmax)
        } else {
            (xmax, 0.0)
        }
    }

    /// True when `value` lies within the axis range widened by `tolerance`
    pub fn axis_contains(&self, axis: Axis, value: f64, tolerance: f64) -> bool {
        let (min, max) = self.range(axis);
        value >= min - tolerance && value <= max + tolerance
    }

    /// True when every component of `p` is within range
    pub fn contains(&self, p: &V3, tolerance: f64) -> bool {
        p.iter().all(|(axis, v)| self.axis_contains(axis, v, tolerance))
    }

    /// Check a single coordinate against its axis range
    pub fn check_axis(&self, axis: Axis, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() {
            tracing::warn!("Rejected non-finite position {} on {}", value, axis);
            return Err(ValidationError::InvalidPosition { axis, value });
        }
        if !self.axis_contains(axis, value, 0.0) {
            let (min, max) = self.range(axis);
            tracing::warn!(
                "Rejected position {} on {}: outside [{}, {}]",
                value,
                axis,
                min,
                max
            );
            return Err(ValidationError::PositionOutOfRange { axis, value, min, max });
        }
        Ok(())
    }

    /// Check a target position against all axis ranges
    pub fn check_position(&self, p: &V3) -> Result<(), ValidationError> {
        for (axis, value) in p.iter() {
            self.check_axis(axis, value)?;
        }
        Ok(())
    }

    /// Check a velocity vector against the per-axis maxima
    pub fn check_velocity(&self, v: &V3) -> Result<(), ValidationError> {
        for (axis, value) in v.iter() {
            let max = self.vmax[axis];
            if !value.is_finite() || value.abs() > max {
                tracing::warn!("Rejected velocity {} on {}: maximum is {}", value, axis, max);
                return Err(ValidationError::VelocityOutOfRange { axis, value, max });
            }
        }
        Ok(())
    }

    /// Largest scalar speed along unit direction `u` that keeps every
    /// axis within its `vmax`
    pub fn max_speed_along(&self, u: &V3) -> f64 {
        scalar_bound(&self.vmax, u)
    }

    /// Largest scalar acceleration along unit direction `u` that keeps
    /// every axis within its `amax`
    pub fn max_accel_along(&self, u: &V3) -> f64 {
        scalar_bound(&self.amax, u)
    }
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            xmax: V3::new(0.7, 0.7, 0.4),
            vmax: V3::new(0.4, 0.4, 0.04),
            amax: V3::new(1.0, 1.0, 0.1),
        }
    }
}

fn invalid(axis: Axis, reason: String) -> ValidationError {
    tracing::warn!("Invalid limits on {}: {}", axis, reason);
    ValidationError::InvalidLimits { axis, reason }
}

fn scalar_bound(max: &V3, u: &V3) -> f64 {
    u.iter()
        .filter(|(_, c)| c.abs() > 1e-12)
        .map(|(axis, c)| max[axis] / c.abs())
        .fold(f64::INFINITY, f64::min)
}

/// Steps per meter for each axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepScale(pub V3);

impl StepScale {
    /// Create a scale from steps-per-meter components
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(V3::new(x, y, z))
    }

    /// Absolute step position nearest to `p`
    pub fn to_steps(&self, p: &V3) -> [i64; 3] {
        let s = p.hadamard(&self.0);
        [s[0].round() as i64, s[1].round() as i64, s[2].round() as i64]
    }

    /// Convert a step position reported by the firmware into meters
    pub fn to_meters(&self, steps: &[i32; 3]) -> V3 {
        V3::new(
            steps[0] as f64 / self.0[0],
            steps[1] as f64 / self.0[1],
            steps[2] as f64 / self.0[2],
        )
    }

    /// Check that the workspace described by `limits` can be addressed
    /// with 16-bit step counts on every axis
    pub fn check_workspace(&self, limits: &MachineLimits) -> Result<(), ValidationError> {
        for axis in Axis::ALL {
            let scale = self.0[axis];
            if !scale.is_finite() || scale == 0.0 {
                return Err(invalid(axis, format!("scale must be finite and non-zero, got {}", scale)));
            }
            let steps = limits.xmax[axis] * scale;
            if steps < 0.0 {
                return Err(invalid(
                    axis,
                    format!("xmax {} and scale {} have opposite signs", limits.xmax[axis], scale),
                ));
            }
            if steps > MAX_WIRE_VALUE as f64 {
                tracing::warn!("Workspace on {} needs {} steps", axis, steps);
                return Err(ValidationError::WorkspaceTooLarge {
                    axis,
                    steps,
                    max: MAX_WIRE_VALUE,
                });
            }
        }
        Ok(())
    }
}

impl Default for StepScale {
    fn default() -> Self {
        Self::new(10000.0, 10000.0, 50000.0)
    }
}
