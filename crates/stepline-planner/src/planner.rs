//! Trajectory planning
//!
//! The [`Planner`] turns a [`Script`] into a [`Plan`]: a chain of straight
//! [`Segment`]s and, index for index, their [`Atdc`] profiles.
//!
//! Planning starts at an origin, normally the current position reported by
//! the device. Consecutive moves form a *path* that the tool follows
//! without stopping, blending every corner. A non-motion action (wait,
//! delay or trigger) ends the current path: the tool comes to rest, the
//! action executes, and the next move starts a new path from rest.
//!
//! Junction speeds are chosen in three steps:
//!
//! 1. Each corner gets an upper bound from the cruise speeds of its two
//!    segments, the deviation tolerance and the segment lengths.
//! 2. A backward pass makes sure every segment can slow down in time for
//!    the next corner or the end of the path.
//! 3. A forward pass makes sure every segment can speed up from the
//!    previous corner or the start of the path.

use crate::action::Action;
use crate::atdc::{straight_phases, Atdc, Corner};
use crate::script::Script;
use crate::section::Section;
use crate::segment::{Segment, MIN_SEGMENT_LENGTH};
use std::ops::Range;
use stepline_core::{MachineLimits, Result, V3};

/// One step of a plan, in execution order
#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
    /// A run of segments, indexing [`Plan::segments`] and [`Plan::atdc`]
    Path(Range<usize>),
    /// A non-motion action executed with the tool at rest
    Action(Action),
}

/// The output of the planner
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    /// Position the plan starts from
    pub origin: V3,
    /// Corner deviation tolerance used
    pub deviation: f64,
    /// Straight segments in execution order
    pub segments: Vec<Segment>,
    /// Motion profile of each segment, same length and order as `segments`
    pub atdc: Vec<Atdc>,
    /// Paths and actions in execution order
    pub items: Vec<PlanItem>,
}

impl Plan {
    /// True when the plan moves the tool
    pub fn has_motion(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Total motion time in seconds
    pub fn duration(&self) -> f64 {
        self.atdc.last().map(Atdc::end_time).unwrap_or(0.0)
    }

    /// Position of the tool once the plan has executed
    pub fn end_position(&self) -> V3 {
        self.atdc
            .last()
            .map(|atdc| atdc.curve.p1)
            .unwrap_or(self.origin)
    }
}

/// Plans scripts against a fixed set of machine limits
#[derive(Debug, Clone)]
pub struct Planner {
    limits: MachineLimits,
}

impl Planner {
    /// Create a planner, validating the limits
    pub fn new(limits: MachineLimits) -> Result<Self> {
        limits.validate()?;
        Ok(Self { limits })
    }

    /// The limits this planner enforces
    pub fn limits(&self) -> &MachineLimits {
        &self.limits
    }

    /// Plan `script` starting from `origin`
    pub fn plan(&self, script: &Script, origin: V3) -> Result<Plan> {
        script.validate(&self.limits)?;

        let mut plan = Plan {
            origin,
            deviation: script.deviation(),
            ..Plan::default()
        };

        let mut position = origin;
        let mut path_start = 0;
        let mut path_index = 0;
        for action in script.actions() {
            match action {
                Action::Move { p, speed } => {
                    if position.distance(p) < MIN_SEGMENT_LENGTH {
                        tracing::debug!("Skipping move to {}: too close to {}", p, position);
                        continue;
                    }
                    plan.segments
                        .push(Segment::new(position, *p, *speed, &self.limits, path_index));
                    position = *p;
                }
                other => {
                    if plan.segments.len() > path_start {
                        plan.items.push(PlanItem::Path(path_start..plan.segments.len()));
                        path_start = plan.segments.len();
                        path_index += 1;
                    }
                    plan.items.push(PlanItem::Action(other.clone()));
                }
            }
        }
        if plan.segments.len() > path_start {
            plan.items.push(PlanItem::Path(path_start..plan.segments.len()));
        }

        let mut clock = 0.0;
        let paths: Vec<Range<usize>> = plan
            .items
            .iter()
            .filter_map(|item| match item {
                PlanItem::Path(range) => Some(range.clone()),
                PlanItem::Action(_) => None,
            })
            .collect();
        for range in paths {
            let profiles = self.plan_path(&mut plan.segments[range], plan.deviation, &mut clock);
            plan.atdc.extend(profiles);
        }

        for (index, atdc) in plan.atdc.iter().enumerate() {
            atdc.validate(index, &self.limits)?;
        }

        tracing::debug!(
            "Planned {} segments in {} items, {:.3} s of motion",
            plan.segments.len(),
            plan.items.len(),
            plan.duration()
        );
        Ok(plan)
    }

    /// Compute junction speeds and profiles for one path
    fn plan_path(&self, segments: &mut [Segment], deviation: f64, clock: &mut f64) -> Vec<Atdc> {
        let n = segments.len();
        let corners: Vec<Corner> = segments
            .windows(2)
            .map(|pair| Corner::between(&pair[0], &pair[1], &self.limits, deviation))
            .collect();
        let accels: Vec<f64> = segments
            .iter()
            .map(|s| self.limits.max_accel_along(&s.direction))
            .collect();

        // Straight length of each segment with both blends at their largest.
        // Lowering a junction speed only shortens its blend.
        let straight: Vec<f64> = (0..n)
            .map(|k| {
                let lq_in = if k > 0 {
                    corners[k - 1].half_length(corners[k - 1].max_speed)
                } else {
                    0.0
                };
                let lq_out = if k + 1 < n {
                    corners[k].half_length(corners[k].max_speed)
                } else {
                    0.0
                };
                (segments[k].length - lq_in - lq_out).max(0.0)
            })
            .collect();

        let mut speeds: Vec<f64> = corners.iter().map(|c| c.max_speed).collect();
        for j in (0..speeds.len()).rev() {
            let exit = speeds.get(j + 1).copied().unwrap_or(0.0);
            let k = j + 1;
            speeds[j] = speeds[j].min((exit * exit + 2.0 * accels[k] * straight[k]).sqrt());
        }
        for j in 0..speeds.len() {
            let entry = if j > 0 { speeds[j - 1] } else { 0.0 };
            speeds[j] = speeds[j].min((entry * entry + 2.0 * accels[j] * straight[j]).sqrt());
        }

        let mut profiles = Vec::with_capacity(n);
        let mut start = segments[0].p0;
        for k in 0..n {
            let entry = if k > 0 { speeds[k - 1] } else { 0.0 };
            let exit = speeds.get(k).copied().unwrap_or(0.0);
            let lq_in = if k > 0 { corners[k - 1].half_length(entry) } else { 0.0 };
            let lq_out = corners.get(k).map(|c| c.half_length(exit)).unwrap_or(0.0);

            let segment = &mut segments[k];
            segment.entry_speed = entry;
            segment.exit_speed = exit;

            let (accelerate, travel, decelerate) = straight_phases(
                start,
                segment.direction,
                segment.length - lq_in - lq_out,
                (entry, segment.speed, exit),
                accels[k],
                *clock,
            );
            let curve = match corners.get(k) {
                Some(corner) => corner.section(decelerate.p1, exit, decelerate.end_time()),
                None => Section::rest(decelerate.p1, decelerate.end_time()),
            };
            *clock = curve.end_time();
            start = curve.p1;
            profiles.push(Atdc {
                accelerate,
                travel,
                decelerate,
                curve,
            });
        }
        profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ScriptBuilder, Waypoint};

    fn scenario_limits() -> MachineLimits {
        MachineLimits::new(
            V3::new(0.7, 0.7, 0.4),
            V3::new(0.13, 0.13, 0.02),
            V3::new(1.0, 1.0, 0.1),
        )
    }

    #[test]
    fn test_single_move_from_origin() {
        let planner = Planner::new(scenario_limits()).unwrap();
        let script = Script::from_waypoints(0.01, &[Waypoint::new(0.1, 0.0, 0.0, 0.5)]).unwrap();
        let plan = planner.plan(&script, V3::ZERO).unwrap();
        assert_eq!(plan.segments.len(), 1);
        assert_eq!(plan.atdc.len(), 1);
        assert_eq!(plan.items, vec![PlanItem::Path(0..1)]);
        let atdc = &plan.atdc[0];
        // cruise speed 0.065 m/s is reached after about 2 mm
        assert!(atdc.travel.t > 0.0);
        assert!((atdc.curve.p1 - V3::new(0.1, 0.0, 0.0)).norm() < 1e-9);
        assert_eq!(atdc.curve.t, 0.0);
    }

    #[test]
    fn test_move_to_origin_is_empty() {
        let planner = Planner::new(scenario_limits()).unwrap();
        let script = Script::from_waypoints(0.01, &[Waypoint::new(0.0, 0.0, 0.0, 1.0)]).unwrap();
        let plan = planner.plan(&script, V3::ZERO).unwrap();
        assert!(!plan.has_motion());
        assert!(plan.items.is_empty());
        assert_eq!(plan.end_position(), V3::ZERO);
    }

    #[test]
    fn test_actions_split_paths() {
        let planner = Planner::new(MachineLimits::default()).unwrap();
        let mut builder = ScriptBuilder::new();
        builder.begin(0.005).unwrap();
        builder.moveto(0.1, 0.0, 0.0, 1.0).unwrap();
        builder.moveto(0.1, 0.1, 0.0, 1.0).unwrap();
        builder.delay(1.0).unwrap();
        builder.moveto(0.0, 0.1, 0.0, 1.0).unwrap();
        let script = builder.end().unwrap();

        let plan = planner.plan(&script, V3::ZERO).unwrap();
        assert_eq!(plan.segments.len(), 3);
        assert_eq!(plan.items.len(), 3);
        assert_eq!(plan.items[0], PlanItem::Path(0..2));
        assert!(matches!(plan.items[1], PlanItem::Action(Action::Delay { .. })));
        assert_eq!(plan.items[2], PlanItem::Path(2..3));
        // the tool is at rest around the delay
        assert_eq!(plan.segments[1].exit_speed, 0.0);
        assert_eq!(plan.segments[2].entry_speed, 0.0);
        assert!(plan.segments[0].exit_speed > 0.0);
        assert_eq!(plan.segments[2].path, 1);
    }

    #[test]
    fn test_out_of_range_move_rejected() {
        let planner = Planner::new(MachineLimits::default()).unwrap();
        let script = Script::from_waypoints(0.01, &[Waypoint::new(0.1, 0.0, 0.5, 1.0)]).unwrap();
        assert!(planner.plan(&script, V3::ZERO).unwrap_err().is_validation_error());
    }

    #[test]
    fn test_plan_is_continuous() {
        let planner = Planner::new(MachineLimits::default()).unwrap();
        let script = Script::from_waypoints(
            0.002,
            &[
                Waypoint::new(0.2, 0.0, 0.0, 1.0),
                Waypoint::new(0.2, 0.2, 0.05, 0.8),
                Waypoint::new(0.0, 0.05, 0.0, 1.0),
            ],
        )
        .unwrap();
        let plan = planner.plan(&script, V3::ZERO).unwrap();
        let phases: Vec<_> = plan.atdc.iter().flat_map(|a| a.phases()).collect();
        for pair in phases.windows(2) {
            assert!((pair[0].p1 - pair[1].p0).norm() < 1e-9);
            assert!((pair[0].v1 - pair[1].v0).norm() < 1e-9);
            assert!((pair[0].end_time() - pair[1].at).abs() < 1e-9);
        }
        assert!((plan.end_position() - V3::new(0.0, 0.05, 0.0)).norm() < 1e-9);
    }
}
