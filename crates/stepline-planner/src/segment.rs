//! Straight segments between consecutive waypoints

use stepline_core::{MachineLimits, V3};

/// Moves shorter than this are dropped by the planner, in meters
pub const MIN_SEGMENT_LENGTH: f64 = 0.0001;

/// A straight displacement from `p0` to `p1`
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start position
    pub p0: V3,
    /// End position
    pub p1: V3,
    /// Unit direction of travel
    pub direction: V3,
    /// Length in meters
    pub length: f64,
    /// Cruise speed in m/s
    pub speed: f64,
    /// Speed when entering the segment, set by the planner
    pub entry_speed: f64,
    /// Speed when leaving the segment, set by the planner
    pub exit_speed: f64,
    /// Index of the motion path the segment belongs to
    pub path: usize,
}

impl Segment {
    /// A segment from `p0` to `p1` cruising at `fraction` of the highest
    /// speed the axes allow along its direction
    pub fn new(p0: V3, p1: V3, fraction: f64, limits: &MachineLimits, path: usize) -> Self {
        let d = p1 - p0;
        let length = d.norm();
        let direction = d.normalize();
        Self {
            p0,
            p1,
            direction,
            length,
            speed: fraction * limits.max_speed_along(&direction),
            entry_speed: 0.0,
            exit_speed: 0.0,
            path,
        }
    }

    /// Cruise velocity vector
    pub fn velocity(&self) -> V3 {
        self.direction * self.speed
    }

    /// Time to cover the segment at cruise speed
    pub fn transit_time(&self) -> f64 {
        if self.speed > 0.0 {
            self.length / self.speed
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cruise_speed_respects_every_axis() {
        let limits = MachineLimits::new(
            V3::new(0.7, 0.7, 0.4),
            V3::new(0.13, 0.13, 0.02),
            V3::new(1.0, 1.0, 0.1),
        );
        let s = Segment::new(V3::ZERO, V3::new(0.1, 0.0, 0.1), 1.0, &limits, 0);
        let v = s.velocity();
        assert!((v.z() - 0.02).abs() < 1e-12);
        assert!(v.x() <= 0.13);
        assert!((s.transit_time() - s.length / s.speed).abs() < 1e-12);
    }

    #[test]
    fn test_fraction_scales_speed() {
        let limits = MachineLimits::default();
        let full = Segment::new(V3::ZERO, V3::new(0.1, 0.0, 0.0), 1.0, &limits, 0);
        let half = Segment::new(V3::ZERO, V3::new(0.1, 0.0, 0.0), 0.5, &limits, 0);
        assert!((half.speed * 2.0 - full.speed).abs() < 1e-12);
        assert!((full.speed - 0.4).abs() < 1e-12);
    }
}
