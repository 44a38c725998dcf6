//! Four-phase motion profiles
//!
//! Every [`Segment`] of a plan is executed as an [`Atdc`] profile:
//!
//! 1. **Accelerate** from the entry speed towards the cruise speed
//! 2. **Travel** at cruise speed
//! 3. **Decelerate** to the speed of the upcoming corner
//! 4. **Curve** around the corner into the next segment
//!
//! The straight phases accelerate along the segment direction at the
//! largest rate every axis allows. When a segment is too short to reach
//! cruise speed the Travel phase has zero duration and the profile is a
//! triangle. The Curve phase is a parabolic blend under constant
//! acceleration that turns the velocity from the incoming to the outgoing
//! direction while staying within the deviation tolerance of the corner.

use crate::section::Section;
use crate::segment::Segment;
use stepline_core::{CompileError, MachineLimits, V3};

/// Direction changes smaller than this are treated as straight
const STRAIGHT_THRESHOLD: f64 = 1e-6;

/// Accelerate, Travel, Decelerate and Curve phases of one segment
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Atdc {
    /// Speed-up phase
    pub accelerate: Section,
    /// Constant-speed phase
    pub travel: Section,
    /// Slow-down phase
    pub decelerate: Section,
    /// Corner blend into the next segment
    pub curve: Section,
}

impl Atdc {
    /// Phases in execution order
    pub fn phases(&self) -> [&Section; 4] {
        [&self.accelerate, &self.travel, &self.decelerate, &self.curve]
    }

    /// Absolute start time
    pub fn start_time(&self) -> f64 {
        self.accelerate.at
    }

    /// Absolute end time
    pub fn end_time(&self) -> f64 {
        self.curve.end_time()
    }

    /// Total duration of the four phases
    pub fn duration(&self) -> f64 {
        self.phases().iter().map(|s| s.t).sum()
    }

    /// Check every phase against the machine limits
    pub fn validate(&self, index: usize, limits: &MachineLimits) -> Result<(), CompileError> {
        const NAMES: [&str; 4] = ["accelerate", "travel", "decelerate", "curve"];
        for (name, section) in NAMES.iter().zip(self.phases()) {
            if let Err(reason) = section.check(limits) {
                tracing::warn!("Segment {} {} phase rejected: {}", index, name, reason);
                return Err(CompileError::InvalidPlan {
                    reason: format!("segment {} {} phase: {}", index, name, reason),
                });
            }
        }
        Ok(())
    }
}

/// Geometry of the blend between two consecutive segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Corner {
    /// Incoming unit direction
    u0: V3,
    /// Outgoing unit direction
    u1: V3,
    /// `|u0 - u1|`, zero for a straight junction
    spread: f64,
    /// Unit direction of the blend acceleration
    ey: V3,
    /// Blend acceleration magnitude
    am: f64,
    /// Highest junction speed allowed by the speeds, lengths and deviation
    pub max_speed: f64,
}

impl Corner {
    /// Corner between `s0` and the following segment `s1`
    pub fn between(s0: &Segment, s1: &Segment, limits: &MachineLimits, deviation: f64) -> Self {
        let u0 = s0.direction;
        let u1 = s1.direction;
        let cruise = s0.speed.min(s1.speed);
        let spread = (u0 - u1).norm();
        if spread < STRAIGHT_THRESHOLD {
            return Self {
                u0,
                u1,
                spread: 0.0,
                ey: V3::ZERO,
                am: 0.0,
                max_speed: cruise,
            };
        }

        let ey = -(u0 - u1) / spread;
        let am = limits.max_accel_along(&ey);
        // deviation (w·spread/2)² / (2·am) must stay within tolerance
        let by_deviation = 2.0 * (2.0 * am * deviation).sqrt() / spread;
        // the blend may use at most half of either segment
        let by_length = (am * s0.length.min(s1.length) / spread).sqrt();
        Self {
            u0,
            u1,
            spread,
            ey,
            am,
            max_speed: cruise.min(by_deviation).min(by_length),
        }
    }

    /// Distance from the junction to either end of the blend at speed `w`
    pub fn half_length(&self, w: f64) -> f64 {
        if self.spread == 0.0 {
            0.0
        } else {
            w * w * self.spread / (2.0 * self.am)
        }
    }

    /// Distance between the junction and the apex of the blend at speed `w`
    pub fn deviation(&self, w: f64) -> f64 {
        if self.spread == 0.0 {
            0.0
        } else {
            let wy = w * self.spread / 2.0;
            wy * wy / (2.0 * self.am)
        }
    }

    /// Blend section entered at `p0` with speed `w` at absolute time `at`
    pub fn section(&self, p0: V3, w: f64, at: f64) -> Section {
        if self.spread == 0.0 || w <= 0.0 {
            return Section::from_motion(p0, self.u1 * w, V3::ZERO, 0.0, at);
        }
        let t = w * self.spread / self.am;
        Section::from_motion(p0, self.u0 * w, self.ey * self.am, t, at)
    }
}

/// Accelerate, Travel and Decelerate phases along a straight stretch
///
/// Starts at `p0` with speed `w0`, heads along unit direction `u` for
/// `length` meters and ends with speed `w1`, never exceeding `cruise` and
/// accelerating at `accel`.
pub(crate) fn straight_phases(
    p0: V3,
    u: V3,
    length: f64,
    speeds: (f64, f64, f64),
    accel: f64,
    at: f64,
) -> (Section, Section, Section) {
    let (w0, cruise, w1) = speeds;
    let length = length.max(0.0);
    let d_acc = (cruise * cruise - w0 * w0) / (2.0 * accel);
    let d_dec = (cruise * cruise - w1 * w1) / (2.0 * accel);

    let (peak, travel_length) = if d_acc + d_dec <= length {
        (cruise, length - d_acc - d_dec)
    } else {
        let peak = ((2.0 * accel * length + w0 * w0 + w1 * w1) / 2.0).sqrt();
        (peak.min(cruise).max(w0).max(w1), 0.0)
    };

    let t_acc = (peak - w0) / accel;
    let accelerate = Section::from_motion(p0, u * w0, u * accel, t_acc, at);
    let t_travel = if peak > 0.0 { travel_length / peak } else { 0.0 };
    let travel = Section::from_motion(accelerate.p1, u * peak, V3::ZERO, t_travel, accelerate.end_time());
    let t_dec = (peak - w1) / accel;
    let decelerate = Section::from_motion(travel.p1, u * peak, u * -accel, t_dec, travel.end_time());
    (accelerate, travel, decelerate)
}
