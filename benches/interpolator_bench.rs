// Benchmark for the interpolation hot path
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use glam::DQuat;
use std::hint::black_box;
use std::time::Duration;
use tokio::time::Instant;

use obosim::events::EventBus;
use obosim::motion::interpolator::{MotionInterpolator, TurnDirection, slerp_arc};
use obosim::pose::PoseStore;

fn bench_slerp_arc(c: &mut Criterion) {
    let from = DQuat::IDENTITY;
    let to = DQuat::from_rotation_y(270f64.to_radians());

    c.bench_function("slerp_arc long path, 1k samples", |b| {
        b.iter(|| {
            let mut acc = DQuat::IDENTITY;
            for i in 0..1_000 {
                let t = i as f64 / 1_000.0;
                acc = slerp_arc(black_box(from), black_box(to), true, t);
            }
            black_box(acc)
        });
    });

    c.bench_function("slerp_arc short path, 1k samples", |b| {
        let quarter = DQuat::from_rotation_y(90f64.to_radians());
        b.iter(|| {
            let mut acc = DQuat::IDENTITY;
            for i in 0..1_000 {
                let t = i as f64 / 1_000.0;
                acc = slerp_arc(black_box(from), black_box(quarter), false, t);
            }
            black_box(acc)
        });
    });
}

fn bench_plan_stepping(c: &mut Criterion) {
    c.bench_function("translation plan, 1k ticks", |b| {
        b.iter(|| {
            let mut store = PoseStore::new(EventBus::new(4), Instant::now());
            let mut interp = MotionInterpolator::new();
            let start = Instant::now();
            interp.begin_translation(store.pose(), 10.0, Duration::from_secs(10), start);
            for i in 1..=1_000u64 {
                interp.step(&mut store, start + Duration::from_millis(i * 9));
            }
            black_box(store.pose().position)
        });
    });

    c.bench_function("rotation plan, 1k ticks", |b| {
        b.iter(|| {
            let mut store = PoseStore::new(EventBus::new(4), Instant::now());
            let mut interp = MotionInterpolator::new();
            let start = Instant::now();
            interp.begin_rotation(
                store.pose(),
                TurnDirection::Right,
                270.0,
                Duration::from_secs(10),
                start,
            );
            for i in 1..=1_000u64 {
                interp.step(&mut store, start + Duration::from_millis(i * 9));
            }
            black_box(store.pose().orientation)
        });
    });
}

criterion_group!(benches, bench_slerp_arc, bench_plan_stepping);
criterion_main!(benches);
