use proptest::prelude::*;
use stepline_core::{MachineLimits, V3};
use stepline_planner::{Plan, Planner, Script, ScriptBuilder, Slicer, Waypoint};

const TOLERANCE: f64 = 1e-9;

fn limits() -> MachineLimits {
    MachineLimits::new(
        V3::new(0.7, 0.7, 0.4),
        V3::new(0.13, 0.13, 0.02),
        V3::new(1.0, 1.0, 0.1),
    )
}

fn assert_accelerations_bounded(plan: &Plan, limits: &MachineLimits) {
    for atdc in &plan.atdc {
        for phase in atdc.phases() {
            for (axis, a) in phase.a.iter() {
                assert!(
                    a.abs() <= limits.amax[axis] + TOLERANCE,
                    "acceleration {} on {} exceeds {}",
                    a,
                    axis,
                    limits.amax[axis]
                );
            }
        }
    }
}

/// Distance between each blended corner and the apex of its curve
fn corner_deviations(plan: &Plan) -> Vec<f64> {
    plan.segments
        .windows(2)
        .zip(&plan.atdc)
        .filter(|(pair, _)| pair[0].path == pair[1].path)
        .map(|(pair, atdc)| {
            let apex = atdc.curve.position_at(atdc.curve.t / 2.0);
            apex.distance(&pair[0].p1)
        })
        .collect()
}

#[test]
fn test_scenario_single_move_short_segment() {
    // 0.1 m at half speed: cruise 0.065 m/s, reached well within the segment
    let planner = Planner::new(limits()).unwrap();
    let script = Script::from_waypoints(0.01, &[Waypoint::new(0.1, 0.0, 0.0, 0.5)]).unwrap();
    let plan = planner.plan(&script, V3::ZERO).unwrap();

    assert_eq!(plan.segments.len(), 1);
    assert_eq!(plan.atdc.len(), 1);
    let atdc = &plan.atdc[0];
    assert!((atdc.accelerate.v1.x() - 0.065).abs() < TOLERANCE);
    assert!(atdc.travel.t > 0.0);
    assert!((atdc.decelerate.v1.norm()) < TOLERANCE);
}

#[test]
fn test_scenario_single_move_triangle_profile() {
    // low acceleration: 0.1 m is shorter than accelerate + decelerate
    let slow = MachineLimits::new(
        V3::new(0.7, 0.7, 0.4),
        V3::new(0.13, 0.13, 0.02),
        V3::new(0.01, 0.01, 0.01),
    );
    let planner = Planner::new(slow).unwrap();
    let script = Script::from_waypoints(0.01, &[Waypoint::new(0.1, 0.0, 0.0, 1.0)]).unwrap();
    let plan = planner.plan(&script, V3::ZERO).unwrap();

    assert_eq!(plan.segments.len(), 1);
    let atdc = &plan.atdc[0];
    assert_eq!(atdc.travel.t, 0.0);
    assert!(atdc.accelerate.v1.x() < 0.13);
    assert!((atdc.decelerate.p1.x() - 0.1).abs() < TOLERANCE);
    assert!((atdc.accelerate.t - atdc.decelerate.t).abs() < TOLERANCE);
}

#[test]
fn test_slow_long_move_is_planned() {
    // 0.3 m of z at 5% of 0.02 m/s cruises for about five minutes
    let planner = Planner::new(limits()).unwrap();
    let script = Script::from_waypoints(0.001, &[Waypoint::new(0.0, 0.0, 0.3, 0.05)]).unwrap();
    let plan = planner.plan(&script, V3::ZERO).unwrap();

    assert_eq!(plan.atdc.len(), 1);
    let travel = &plan.atdc[0].travel;
    assert!((travel.v0.z() - 0.001).abs() < TOLERANCE);
    assert!(travel.t > 290.0 && travel.t < 300.0, "travel lasts {} s", travel.t);

    let sections = Slicer::default().slice(&plan);
    assert!(sections.iter().all(|s| s.t <= 32.0 + TOLERANCE));
    let last = sections.last().unwrap();
    assert!((last.p1 - V3::new(0.0, 0.0, 0.3)).norm() < TOLERANCE);
}

#[test]
fn test_fewer_than_two_waypoints_is_empty() {
    let planner = Planner::new(limits()).unwrap();
    let origin = V3::new(0.2, 0.2, 0.1);
    let script = Script::from_waypoints(0.01, &[Waypoint::new(0.2, 0.2, 0.1, 1.0)]).unwrap();
    let plan = planner.plan(&script, origin).unwrap();
    assert!(plan.segments.is_empty());
    assert!(plan.atdc.is_empty());

    let mut builder = ScriptBuilder::new();
    builder.begin(0.01).unwrap();
    let plan = planner.plan(&builder.end().unwrap(), origin).unwrap();
    assert!(!plan.has_motion());
}

#[test]
fn test_tight_tolerance_slows_corner() {
    let planner = Planner::new(MachineLimits::default()).unwrap();
    let waypoints = [
        Waypoint::new(0.3, 0.0, 0.0, 1.0),
        Waypoint::new(0.3, 0.3, 0.0, 1.0),
    ];
    let loose = planner
        .plan(&Script::from_waypoints(0.01, &waypoints).unwrap(), V3::ZERO)
        .unwrap();
    let tight = planner
        .plan(&Script::from_waypoints(0.0001, &waypoints).unwrap(), V3::ZERO)
        .unwrap();
    assert!(tight.segments[0].exit_speed < loose.segments[0].exit_speed);
    assert!(corner_deviations(&tight)[0] <= 0.0001 + TOLERANCE);
    assert!(tight.duration() > loose.duration());
}

fn waypoint() -> impl Strategy<Value = Waypoint> {
    (0.05..0.65f64, 0.05..0.65f64, 0.05..0.35f64, 0.05..=1.0f64)
        .prop_map(|(x, y, z, speed)| Waypoint::new(x, y, z, speed))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_segment_count_matches_moves(
        waypoints in prop::collection::vec(waypoint(), 2..8),
        deviation in 0.0005..0.005f64,
    ) {
        for pair in waypoints.windows(2) {
            prop_assume!(pair[0].p.distance(&pair[1].p) > 0.001);
        }
        let planner = Planner::new(limits()).unwrap();
        let script = Script::from_waypoints(deviation, &waypoints).unwrap();
        // the first waypoint is where the tool already is
        let plan = planner.plan(&script, waypoints[0].p).unwrap();
        prop_assert_eq!(plan.segments.len(), waypoints.len() - 1);
        prop_assert_eq!(plan.atdc.len(), plan.segments.len());
    }

    #[test]
    fn prop_accelerations_and_deviation_bounded(
        waypoints in prop::collection::vec(waypoint(), 1..8),
        deviation in 0.0005..0.005f64,
    ) {
        let l = limits();
        let planner = Planner::new(l).unwrap();
        let script = Script::from_waypoints(deviation, &waypoints).unwrap();
        let plan = planner.plan(&script, V3::new(0.05, 0.05, 0.05)).unwrap();
        assert_accelerations_bounded(&plan, &l);
        for d in corner_deviations(&plan) {
            prop_assert!(d <= deviation + TOLERANCE, "deviation {} > {}", d, deviation);
        }
        // moves shorter than the minimum segment length are dropped
        prop_assert!((plan.end_position() - waypoints.last().unwrap().p).norm() < 2e-4);
    }
}
