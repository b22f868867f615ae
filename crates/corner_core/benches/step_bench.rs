//! Per-tick stepping cost
//!
//! Run with:
//!   cargo bench -p corner_core --bench step_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use corner_core::catalog::Catalog;
use corner_core::geometry::loc;
use corner_core::trigger::Condition;
use corner_core::{EngineConfig, KinematicSimulator, RunConfiguration, RunEntry, ScenarioRunOrchestrator};

fn plan(entries: usize) -> RunConfiguration {
    let mut plan = RunConfiguration::new(1, 1, 1.0).with_overlap(true);
    for i in 0..entries {
        let anchor = loc(20.0 + 10.0 * i as f64, 0.0, 0.0);
        // cycle through every built-in definition
        let case = (i % 32) as u16 + 1;
        plan = plan.with_entry(RunEntry::new(
            case,
            anchor,
            Condition::EgoWithinRadius { point: anchor, radius: 25.0 },
            Condition::Never,
        ));
    }
    plan
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("orchestrator_step");
    let catalog = Catalog::builtin().expect("catalog");

    for entries in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("entries", entries), &entries, |b, &n| {
            b.iter_batched(
                || {
                    let sim = KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 10.0);
                    let mut run = ScenarioRunOrchestrator::new(sim, catalog.clone(), EngineConfig::dataset());
                    run.start(plan(n)).expect("start");
                    run
                },
                |mut run| {
                    for _ in 0..100 {
                        black_box(run.step().expect("step"));
                    }
                    run
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_record_digest(c: &mut Criterion) {
    let sim = KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 10.0);
    let mut run = ScenarioRunOrchestrator::new(sim, Catalog::builtin().expect("catalog"), EngineConfig::dataset());
    run.start(plan(16)).expect("start");
    for _ in 0..400 {
        run.step().expect("step");
    }

    c.bench_function("record_digest", |b| b.iter(|| black_box(run.record().digest())));
    c.bench_function("record_compact", |b| b.iter(|| black_box(run.record().to_compact().expect("encode"))));
}

criterion_group!(benches, bench_step, bench_record_digest);
criterion_main!(benches);
