//! Planning and slicing throughput for scripts of increasing length.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stepline_core::{MachineLimits, V3};
use stepline_planner::{Planner, Script, Slicer, Waypoint};

/// A raster scan over the workspace with `rows` passes
fn raster(rows: usize) -> Script {
    let mut waypoints = Vec::with_capacity(rows * 2);
    for row in 0..rows {
        let y = 0.05 + 0.5 * row as f64 / rows as f64;
        let (from, to) = if row % 2 == 0 { (0.05, 0.6) } else { (0.6, 0.05) };
        waypoints.push(Waypoint::new(from, y, 0.0, 1.0));
        waypoints.push(Waypoint::new(to, y, 0.0, 1.0));
    }
    Script::from_waypoints(0.002, &waypoints).unwrap()
}

fn bench_plan(c: &mut Criterion) {
    let planner = Planner::new(MachineLimits::default()).unwrap();
    let mut group = c.benchmark_group("plan");
    for rows in [4, 32, 256] {
        let script = raster(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &script, |b, script| {
            b.iter(|| planner.plan(black_box(script), V3::ZERO).unwrap())
        });
    }
    group.finish();
}

fn bench_slice(c: &mut Criterion) {
    let planner = Planner::new(MachineLimits::default()).unwrap();
    let slicer = Slicer::default();
    let mut group = c.benchmark_group("slice");
    for rows in [4, 32] {
        let plan = planner.plan(&raster(rows), V3::ZERO).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &plan, |b, plan| {
            b.iter(|| slicer.slice(black_box(plan)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan, bench_slice);
criterion_main!(benches);
