use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stepline_core::{MachineLimits, V3};
use stepline_planner::{Action, Planner, Script, ScriptBuilder, Slicer, Waypoint};

fn zigzag() -> Script {
    Script::from_waypoints(
        0.002,
        &[
            Waypoint::new(0.2, 0.0, 0.0, 1.0),
            Waypoint::new(0.2, 0.1, 0.0, 0.6),
            Waypoint::new(0.3, 0.1, 0.1, 1.0),
            Waypoint::new(0.3, 0.3, 0.1, 0.3),
        ],
    )
    .unwrap()
}

#[test]
fn test_reslicing_is_idempotent() {
    let planner = Planner::new(MachineLimits::default()).unwrap();
    let plan = planner.plan(&zigzag(), V3::ZERO).unwrap();
    let slicer = Slicer::new(0.012, 32.0).unwrap();
    let first = slicer.slice(&plan);
    let second = slicer.slice(&plan);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_sections_are_contiguous() {
    let planner = Planner::new(MachineLimits::default()).unwrap();
    let plan = planner.plan(&zigzag(), V3::ZERO).unwrap();
    let sections = Slicer::default().slice(&plan);

    assert_eq!(sections.first().unwrap().p0, V3::ZERO);
    for pair in sections.windows(2) {
        assert!((pair[0].p1 - pair[1].p0).norm() < 1e-9);
        assert!((pair[0].end_time() - pair[1].at).abs() < 1e-9);
    }
    let last = sections.last().unwrap();
    assert!((last.p1 - V3::new(0.3, 0.3, 0.1)).norm() < 1e-9);
    assert!((last.end_time() - plan.duration()).abs() < 1e-9);
}

#[test]
fn test_accelerating_sections_respect_period() {
    let planner = Planner::new(MachineLimits::default()).unwrap();
    let plan = planner.plan(&zigzag(), V3::ZERO).unwrap();
    let slicer = Slicer::new(0.014, 2.0).unwrap();
    for section in slicer.slice(&plan) {
        assert!(section.t > 0.0);
        if section.a.norm() > 0.0 {
            assert!(section.t <= 0.014 + 1e-12);
        } else {
            assert!(section.t <= 2.0 + 1e-12);
        }
        // analytic end state
        let v1 = section.v0 + section.a * section.t;
        assert!((section.v1 - v1).norm() < 1e-9);
        let d = section.v0 * section.t + section.a * (section.t * section.t / 2.0);
        assert!((section.d - d).norm() < 1e-9);
    }
}

#[test]
fn test_actions_inserted_in_order_at_rest_point() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let mut builder = ScriptBuilder::new();
    builder.begin(0.001).unwrap();
    builder.delay(0.25).unwrap();
    builder.moveto(0.1, 0.0, 0.0, 1.0).unwrap();
    builder
        .trigger(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            7,
        )
        .unwrap();
    builder.wait().unwrap();
    builder.moveto(0.1, 0.1, 0.0, 1.0).unwrap();
    let script = builder.end().unwrap();

    let planner = Planner::new(MachineLimits::default()).unwrap();
    let plan = planner.plan(&script, V3::ZERO).unwrap();
    let sections = Slicer::default().slice(&plan);

    let actions: Vec<_> = sections
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.actions.is_empty())
        .collect();
    assert_eq!(actions.len(), 3);

    let (first, delay) = actions[0];
    assert_eq!(first, 0);
    assert_eq!(delay.actions, vec![Action::Delay { seconds: 0.25 }]);
    assert_eq!(delay.p0, V3::ZERO);

    let (_, trigger) = actions[1];
    assert!(matches!(trigger.actions[0], Action::Trigger { arg: 7, .. }));
    assert!((trigger.p0 - V3::new(0.1, 0.0, 0.0)).norm() < 1e-9);
    assert_eq!(trigger.t, 0.0);
    assert_eq!(trigger.d, V3::ZERO);

    let (third, wait) = actions[2];
    assert_eq!(wait.actions, vec![Action::Wait]);
    assert!(sections[third + 1].is_motion());

    // slicing never invokes callbacks
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
