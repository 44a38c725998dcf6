//! Fixed-period resampling of a plan
//!
//! The [`Slicer`] cuts every phase of a [`Plan`] into [`Section`]s short
//! enough for the firmware: accelerating phases are cut every `period`
//! seconds, constant-velocity phases every `max_duration` seconds. The
//! non-motion actions of the plan are inserted as zero-duration sections
//! at the point where the tool rests.

use crate::planner::{Plan, PlanItem};
use crate::section::Section;
use stepline_core::{ValidationError, MAX_WIRE_VALUE};

/// Default sampling period in seconds
pub const DEFAULT_PERIOD: f64 = 0.010;

/// Default cap on the duration of a constant-velocity slice in seconds
pub const DEFAULT_MAX_DURATION: f64 = 32.0;

/// Resamples plans at a fixed period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slicer {
    period: f64,
    max_duration: f64,
}

impl Slicer {
    /// Create a slicer
    ///
    /// `period` must be positive and `max_duration` must lie between
    /// `period` and the longest block the firmware accepts.
    pub fn new(period: f64, max_duration: f64) -> Result<Self, ValidationError> {
        if !period.is_finite() || period <= 0.0 {
            tracing::warn!("Rejected slicing period {}", period);
            return Err(ValidationError::InvalidSlicing {
                name: "period",
                value: period,
            });
        }
        let longest = MAX_WIRE_VALUE as f64 / 1000.0;
        if !max_duration.is_finite() || max_duration < period || max_duration > longest {
            tracing::warn!(
                "Rejected maximum slice duration {} (period {}, longest {})",
                max_duration,
                period,
                longest
            );
            return Err(ValidationError::InvalidSlicing {
                name: "max_duration",
                value: max_duration,
            });
        }
        Ok(Self {
            period,
            max_duration,
        })
    }

    /// Sampling period in seconds
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Cap on constant-velocity slices in seconds
    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    /// Slice a plan into sections
    ///
    /// The output is a pure function of the plan and the slicer settings.
    pub fn slice(&self, plan: &Plan) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut position = plan.origin;
        let mut clock = 0.0;

        for item in &plan.items {
            match item {
                PlanItem::Path(range) => {
                    for atdc in &plan.atdc[range.clone()] {
                        for phase in atdc.phases() {
                            let step = if phase.a.norm() == 0.0 {
                                self.max_duration
                            } else {
                                self.period
                            };
                            sections.extend(phase.slice(step));
                        }
                        position = atdc.curve.p1;
                        clock = atdc.curve.end_time();
                    }
                }
                PlanItem::Action(action) => {
                    sections.push(Section::with_action(position, clock, action.clone()));
                }
            }
        }

        tracing::debug!(
            "Sliced {} items into {} sections at {} s",
            plan.items.len(),
            sections.len(),
            self.period
        );
        sections
    }
}

impl Default for Slicer {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}
