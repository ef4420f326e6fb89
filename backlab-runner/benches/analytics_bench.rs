//! Criterion benchmarks for analytics and dispatch.
//!
//! Benchmarks:
//! 1. Risk metrics over finished runs of increasing length
//! 2. Batch dispatch on the calling thread vs. the worker pool

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use backlab_core::data::random_walk;
use backlab_core::engine::{run_simulation, SimulationParams};
use backlab_runner::dispatch::{DispatchThresholds, Dispatcher, DistributedBackend};
use backlab_runner::{BacktestJob, PerformanceTier, RiskMetrics};

fn bench_risk_metrics(c: &mut Criterion) {
    let params = SimulationParams::default();
    let mut group = c.benchmark_group("risk_metrics");
    for n in [1_000usize, 10_000, 100_000] {
        let Ok(sim) = run_simulation(&random_walk(n, 7), &params) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(n), &sim, |b, sim| {
            b.iter(|| {
                RiskMetrics::compute(black_box(&sim.equity_curve), &sim.trades, None, 0.0)
            })
        });
    }
    group.finish();
}

fn bench_batch_dispatch(c: &mut Criterion) {
    let jobs: Vec<BacktestJob> = (0..16)
        .map(|seed| BacktestJob::new(random_walk(5_000, seed), SimulationParams::default()))
        .collect();
    let thresholds = DispatchThresholds {
        fast_min_rows: 1,
        maximum_min_rows: 1,
    };
    let cpu = Dispatcher::new(thresholds.clone());
    let mut group = c.benchmark_group("batch_dispatch");
    group.bench_function("cpu", |b| {
        b.iter(|| cpu.run_batch(PerformanceTier::Standard, black_box(&jobs)))
    });
    if let Ok(pool) = DistributedBackend::new(4) {
        let distributed = Dispatcher::new(thresholds).with_distributed(Arc::new(pool));
        group.bench_function("distributed_4", |b| {
            b.iter(|| distributed.run_batch(PerformanceTier::Fast, black_box(&jobs)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_risk_metrics, bench_batch_dispatch);
criterion_main!(benches);
