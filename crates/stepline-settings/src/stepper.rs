//! Drive train description
//!
//! Machine limits and the step scale follow from the motors, drivers and
//! transmissions of each axis. [`StepperSettings`] describes them and
//! derives the values the controller needs.

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use stepline_core::{Axis, StepScale, V3};

/// Motors, drivers and transmission of each axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepperSettings {
    /// Full steps per motor revolution
    pub steps_per_revolution: V3,
    /// Driver microstepping
    pub microsteps: V3,
    /// Motor revolutions per output revolution
    pub gears_ratio: V3,
    /// Highest motor speed in revolutions per minute
    pub maximum_rpm: V3,
    /// Travel per output revolution in meters; a negative value reverses the axis
    pub displacement_per_revolution: V3,
    /// Highest acceleration in m/s²
    pub maximum_acceleration: V3,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            steps_per_revolution: V3::new(200.0, 200.0, 200.0),
            microsteps: V3::new(8.0, 8.0, 1.0),
            gears_ratio: V3::new(1.0, 1.0, 1.0),
            maximum_rpm: V3::new(300.0, 300.0, 300.0),
            displacement_per_revolution: V3::new(0.04, 0.04, 0.008),
            maximum_acceleration: V3::new(0.3, 0.3, 0.03),
        }
    }
}

impl StepperSettings {
    /// Check that every quantity is usable
    pub fn validate(&self) -> SettingsResult<()> {
        let positive = [
            ("steps_per_revolution", &self.steps_per_revolution),
            ("microsteps", &self.microsteps),
            ("gears_ratio", &self.gears_ratio),
            ("maximum_rpm", &self.maximum_rpm),
            ("maximum_acceleration", &self.maximum_acceleration),
        ];
        for (name, values) in positive {
            for (axis, value) in values.iter() {
                if !value.is_finite() || value <= 0.0 {
                    return Err(SettingsError::invalid(
                        &format!("stepper.{}.{}", name, axis),
                        format!("must be > 0, got {}", value),
                    ));
                }
            }
        }
        for (axis, value) in self.displacement_per_revolution.iter() {
            if !value.is_finite() || value == 0.0 {
                return Err(SettingsError::invalid(
                    &format!("stepper.displacement_per_revolution.{}", axis),
                    format!("must be finite and non-zero, got {}", value),
                ));
            }
        }
        Ok(())
    }

    /// Highest speed of each axis in m/s
    pub fn max_speed(&self) -> V3 {
        V3(Axis::ALL.map(|axis| {
            let i = axis.index();
            self.displacement_per_revolution[i].abs() * self.maximum_rpm[i] / 60.0 / self.gears_ratio[i]
        }))
    }

    /// Steps per meter of each axis, signed like the displacement
    pub fn scale(&self) -> StepScale {
        StepScale(V3(Axis::ALL.map(|axis| {
            let i = axis.index();
            self.gears_ratio[i] * self.microsteps[i] * self.steps_per_revolution[i]
                / self.displacement_per_revolution[i]
        })))
    }

    /// Highest acceleration of each axis in m/s²
    pub fn max_acceleration(&self) -> V3 {
        self.maximum_acceleration
    }
}
