//! Backtest runner — wires together the engine and the analytics.
//!
//! Two entry points:
//! - `run_backtest()`: runs a prepared `BacktestJob`. Used by every backend.
//! - `run_backtest_from_frame()`: converts a bar table first. Used by the CLI.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use backlab_core::data::bars_from_frame;
use backlab_core::domain::{Bar, Trade};
use backlab_core::engine::{
    run_simulation, EquityCurve, OpenPosition, SimulationParams, SimulationResult,
};
use backlab_core::fingerprint::{ContentHash, ContentHasher};
use backlab_core::DataError;

use crate::metrics::RiskMetrics;
use crate::relative::BenchmarkSeries;

/// Errors from the runner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Everything one simulation needs. Inputs are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestJob {
    pub bars: Vec<Bar>,
    pub params: SimulationParams,
    pub benchmark: Option<BenchmarkSeries>,
}

impl BacktestJob {
    pub fn new(bars: Vec<Bar>, params: SimulationParams) -> Self {
        Self {
            bars,
            params,
            benchmark: None,
        }
    }

    pub fn with_benchmark(mut self, benchmark: BenchmarkSeries) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    pub fn row_count(&self) -> usize {
        self.bars.len()
    }

    /// Stable content key over bars, parameters and benchmark.
    pub fn cache_key(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        hasher.update_bars(&self.bars).update_params(&self.params);
        match &self.benchmark {
            Some(bench) => {
                let millis: Vec<f64> = bench
                    .points
                    .iter()
                    .map(|(ts, _)| ts.and_utc().timestamp_millis() as f64)
                    .collect();
                let values: Vec<f64> = bench.points.iter().map(|(_, r)| *r).collect();
                hasher
                    .update_str("benchmark")
                    .update_f64s(&millis)
                    .update_f64s(&values);
            }
            None => {
                hasher.update_str("no-benchmark");
            }
        }
        hasher.finish()
    }
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub metrics: RiskMetrics,
    pub equity_curve: EquityCurve,
    pub trades: Vec<Trade>,
    pub open_position: Option<OpenPosition>,
    pub bar_count: usize,
    pub dropped_rows: usize,
}

impl BacktestResult {
    /// Attach metrics to a finished simulation of `job`.
    pub fn from_simulation(job: &BacktestJob, sim: SimulationResult) -> Self {
        let metrics = RiskMetrics::compute(
            &sim.equity_curve,
            &sim.trades,
            job.benchmark.as_ref(),
            job.params.risk_free_rate,
        );
        debug!(
            bars = sim.equity_curve.len(),
            trades = sim.trades.len(),
            sharpe = metrics.sharpe,
            "backtest complete"
        );

        Self {
            metrics,
            bar_count: sim.equity_curve.len(),
            equity_curve: sim.equity_curve,
            trades: sim.trades,
            open_position: sim.open_position,
            dropped_rows: sim.dropped_rows,
        }
    }
}

/// Run one job on the calling thread: simulate, then compute metrics.
pub fn run_backtest(job: &BacktestJob) -> Result<BacktestResult, RunError> {
    let sim = run_simulation(&job.bars, &job.params)?;
    Ok(BacktestResult::from_simulation(job, sim))
}

/// Build a job from a bar table.
pub fn job_from_frame(
    df: &DataFrame,
    signal_column: &str,
    params: SimulationParams,
) -> Result<BacktestJob, RunError> {
    let bars = bars_from_frame(df, signal_column)?;
    Ok(BacktestJob::new(bars, params))
}

/// Convert a bar table and run it.
pub fn run_backtest_from_frame(
    df: &DataFrame,
    signal_column: &str,
    params: SimulationParams,
    benchmark: Option<BenchmarkSeries>,
) -> Result<BacktestResult, RunError> {
    let mut job = job_from_frame(df, signal_column, params)?;
    job.benchmark = benchmark;
    run_backtest(&job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlab_core::data::{bars_to_frame, random_walk};

    #[test]
    fn runs_and_computes_metrics() {
        let job = BacktestJob::new(random_walk(300, 1), SimulationParams::default());
        let result = run_backtest(&job).unwrap();
        assert_eq!(result.bar_count, 300);
        assert_eq!(result.metrics.total_trades, result.trades.len());
        assert!(result.metrics.max_drawdown >= 0.0 && result.metrics.max_drawdown <= 1.0);
    }

    #[test]
    fn data_errors_propagate() {
        let job = BacktestJob::new(random_walk(1, 1), SimulationParams::default());
        assert!(matches!(
            run_backtest(&job),
            Err(RunError::Data(DataError::InsufficientRows { .. }))
        ));
    }

    #[test]
    fn frame_entry_point_matches_direct_run() {
        let bars = random_walk(200, 4);
        let df = bars_to_frame(&bars).unwrap();
        let via_frame =
            run_backtest_from_frame(&df, "signal", SimulationParams::default(), None).unwrap();
        let direct = run_backtest(&BacktestJob::new(bars, SimulationParams::default())).unwrap();
        assert_eq!(via_frame, direct);
    }

    #[test]
    fn cache_key_covers_benchmark() {
        let bars = random_walk(50, 2);
        let plain = BacktestJob::new(bars.clone(), SimulationParams::default());
        let with_bench = plain
            .clone()
            .with_benchmark(BenchmarkSeries::from_bars(&random_walk(50, 3)));
        assert_eq!(plain.cache_key(), plain.clone().cache_key());
        assert_ne!(plain.cache_key(), with_bench.cache_key());
    }
}
