//! Backend dispatcher: picks an execution strategy for a backtest job.
//!
//! Every backend computes the same thing as [`CpuBackend`]; they differ only
//! in where and how the work runs. A failing backend is retried once on the
//! CPU reference path.

mod accelerated;
mod cache;
mod cached;
mod cpu;
mod distributed;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use accelerated::{Accelerator, AcceleratedBackend};
pub use cache::{ResultCache, TtlLruCache};
pub use cached::CachedBackend;
pub use cpu::CpuBackend;
pub use distributed::DistributedBackend;

use crate::runner::{BacktestJob, BacktestResult, RunError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("{0} backend unavailable")]
    Unavailable(BackendKind),

    #[error("{backend} backend failed: {message}")]
    Failed {
        backend: BackendKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cpu,
    Accelerated,
    Distributed,
    Cached,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Accelerated => "accelerated",
            Self::Distributed => "distributed",
            Self::Cached => "cached",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of executing a backtest job.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the backend can take work right now.
    fn is_available(&self) -> bool {
        true
    }

    fn execute(&self, job: &BacktestJob) -> Result<BacktestResult, BackendError>;
}

/// Requested performance tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    /// Always the CPU reference path.
    #[default]
    Standard,
    Fast,
    Maximum,
}

impl std::str::FromStr for PerformanceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "fast" => Ok(Self::Fast),
            "maximum" => Ok(Self::Maximum),
            other => Err(format!("unknown performance tier '{other}'")),
        }
    }
}

/// Row-count thresholds below which a tier still runs on the CPU backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchThresholds {
    pub fast_min_rows: usize,
    pub maximum_min_rows: usize,
}

impl Default for DispatchThresholds {
    fn default() -> Self {
        Self {
            fast_min_rows: 100_000,
            maximum_min_rows: 10_000,
        }
    }
}

impl DispatchThresholds {
    fn min_rows(&self, tier: PerformanceTier) -> usize {
        match tier {
            PerformanceTier::Standard => usize::MAX,
            PerformanceTier::Fast => self.fast_min_rows,
            PerformanceTier::Maximum => self.maximum_min_rows,
        }
    }
}

/// A result together with the backend that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: BacktestResult,
    pub backend: BackendKind,
    /// True when the selected backend failed and the CPU retry answered.
    pub fell_back: bool,
}

pub struct Dispatcher {
    cpu: CpuBackend,
    accelerated: Option<Arc<dyn Backend>>,
    distributed: Option<Arc<DistributedBackend>>,
    cached: Option<Arc<dyn Backend>>,
    thresholds: DispatchThresholds,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatchThresholds::default())
    }
}

impl Dispatcher {
    /// A dispatcher with only the CPU backend configured.
    pub fn new(thresholds: DispatchThresholds) -> Self {
        Self {
            cpu: CpuBackend,
            accelerated: None,
            distributed: None,
            cached: None,
            thresholds,
        }
    }

    pub fn with_accelerated(mut self, backend: Arc<dyn Backend>) -> Self {
        self.accelerated = Some(backend);
        self
    }

    pub fn with_distributed(mut self, backend: Arc<DistributedBackend>) -> Self {
        self.distributed = Some(backend);
        self
    }

    pub fn with_cached(mut self, backend: Arc<dyn Backend>) -> Self {
        self.cached = Some(backend);
        self
    }

    pub fn thresholds(&self) -> &DispatchThresholds {
        &self.thresholds
    }

    /// Backend for a tier and table size.
    ///
    /// Below the tier's row threshold the CPU backend always runs. Above it
    /// the order of preference is accelerated, distributed, cached, and
    /// finally CPU when none of those is configured and available.
    pub fn select(&self, tier: PerformanceTier, rows: usize) -> &dyn Backend {
        if rows < self.thresholds.min_rows(tier) {
            return &self.cpu;
        }
        if let Some(b) = self.accelerated.as_deref().filter(|b| b.is_available()) {
            return b;
        }
        if let Some(b) = self.distributed.as_deref().filter(|b| b.is_available()) {
            return b;
        }
        if let Some(b) = self.cached.as_deref().filter(|b| b.is_available()) {
            return b;
        }
        &self.cpu
    }

    /// Run `job` on the selected backend, retrying once on the CPU backend
    /// if it fails.
    pub fn run(&self, tier: PerformanceTier, job: &BacktestJob) -> Result<Dispatched, BackendError> {
        let backend = self.select(tier, job.row_count());
        let kind = backend.kind();
        debug!(backend = %kind, rows = job.row_count(), ?tier, "dispatching job");

        match backend.execute(job) {
            Ok(result) => Ok(Dispatched {
                result,
                backend: kind,
                fell_back: false,
            }),
            Err(e) if kind != BackendKind::Cpu => {
                warn!(backend = %kind, error = %e, "backend failed, retrying on cpu");
                let result = self.cpu.execute(job)?;
                Ok(Dispatched {
                    result,
                    backend: BackendKind::Cpu,
                    fell_back: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Run independent jobs. Uses the distributed pool when one is configured
    /// and the tier allows it, otherwise runs them one after another.
    pub fn run_batch(
        &self,
        tier: PerformanceTier,
        jobs: &[BacktestJob],
    ) -> Vec<Result<Dispatched, BackendError>> {
        let total_rows: usize = jobs.iter().map(BacktestJob::row_count).sum();
        let pool = self
            .distributed
            .as_ref()
            .filter(|d| d.is_available() && total_rows >= self.thresholds.min_rows(tier));

        match pool {
            Some(pool) => pool
                .execute_batch(jobs)
                .into_iter()
                .zip(jobs)
                .map(|(outcome, job)| match outcome {
                    Ok(result) => Ok(Dispatched {
                        result,
                        backend: BackendKind::Distributed,
                        fell_back: false,
                    }),
                    Err(e) => {
                        warn!(backend = "distributed", error = %e, "batch job failed, retrying on cpu");
                        self.cpu.execute(job).map(|result| Dispatched {
                            result,
                            backend: BackendKind::Cpu,
                            fell_back: true,
                        })
                    }
                })
                .collect(),
            None => jobs.iter().map(|job| self.run(tier, job)).collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use backlab_core::data::random_walk;
    use backlab_core::engine::SimulationParams;

    fn job(n: usize) -> BacktestJob {
        BacktestJob::new(random_walk(n, 11), SimulationParams::default())
    }

    fn small_thresholds() -> DispatchThresholds {
        DispatchThresholds {
            fast_min_rows: 500,
            maximum_min_rows: 100,
        }
    }

    #[test]
    fn standard_tier_always_uses_cpu() {
        let d = Dispatcher::new(small_thresholds())
            .with_accelerated(Arc::new(EchoBackend(BackendKind::Accelerated)));
        assert_eq!(d.select(PerformanceTier::Standard, 1_000_000).kind(), BackendKind::Cpu);
    }

    #[test]
    fn small_tables_use_cpu() {
        let d = Dispatcher::new(small_thresholds())
            .with_accelerated(Arc::new(EchoBackend(BackendKind::Accelerated)));
        assert_eq!(d.select(PerformanceTier::Fast, 499).kind(), BackendKind::Cpu);
        assert_eq!(d.select(PerformanceTier::Fast, 500).kind(), BackendKind::Accelerated);
        assert_eq!(d.select(PerformanceTier::Maximum, 100).kind(), BackendKind::Accelerated);
    }

    #[test]
    fn preference_order_skips_unavailable() {
        let d = Dispatcher::new(small_thresholds())
            .with_accelerated(Arc::new(OfflineBackend))
            .with_distributed(Arc::new(DistributedBackend::new(2).unwrap()))
            .with_cached(Arc::new(EchoBackend(BackendKind::Cached)));
        assert_eq!(d.select(PerformanceTier::Maximum, 1_000).kind(), BackendKind::Distributed);

        let d = Dispatcher::new(small_thresholds())
            .with_accelerated(Arc::new(OfflineBackend))
            .with_cached(Arc::new(EchoBackend(BackendKind::Cached)));
        assert_eq!(d.select(PerformanceTier::Maximum, 1_000).kind(), BackendKind::Cached);

        let d = Dispatcher::new(small_thresholds()).with_accelerated(Arc::new(OfflineBackend));
        assert_eq!(d.select(PerformanceTier::Maximum, 1_000).kind(), BackendKind::Cpu);
    }

    #[test]
    fn failing_backend_falls_back_to_cpu() {
        let d = Dispatcher::new(small_thresholds())
            .with_accelerated(Arc::new(FailingBackend(BackendKind::Accelerated)));
        let out = d.run(PerformanceTier::Maximum, &job(300)).unwrap();
        assert!(out.fell_back);
        assert_eq!(out.backend, BackendKind::Cpu);

        let reference = CpuBackend.execute(&job(300)).unwrap();
        assert_eq!(out.result, reference);
    }

    #[test]
    fn cpu_errors_are_not_retried() {
        let d = Dispatcher::default();
        let err = d.run(PerformanceTier::Standard, &job(1)).unwrap_err();
        assert!(matches!(err, BackendError::Run(_)));
    }

    #[test]
    fn alternate_backend_matches_cpu() {
        let d = Dispatcher::new(small_thresholds())
            .with_accelerated(Arc::new(EchoBackend(BackendKind::Accelerated)));
        let job = job(400);
        let fast = d.run(PerformanceTier::Maximum, &job).unwrap();
        let reference = d.run(PerformanceTier::Standard, &job).unwrap();
        assert_eq!(fast.backend, BackendKind::Accelerated);
        assert_eq!(reference.backend, BackendKind::Cpu);
        let diff = fast
            .result
            .metrics
            .max_relative_diff(&reference.result.metrics)
            .unwrap();
        assert!(diff <= 1e-9);
    }

    #[test]
    fn batch_runs_every_job() {
        let d = Dispatcher::new(small_thresholds())
            .with_distributed(Arc::new(DistributedBackend::new(2).unwrap()));
        let jobs: Vec<BacktestJob> = (0..4)
            .map(|s| BacktestJob::new(random_walk(200, s), SimulationParams::default()))
            .collect();
        let out = d.run_batch(PerformanceTier::Maximum, &jobs);
        assert_eq!(out.len(), 4);
        for (dispatched, job) in out.into_iter().zip(&jobs) {
            let dispatched = dispatched.unwrap();
            assert_eq!(dispatched.backend, BackendKind::Distributed);
            assert_eq!(dispatched.result, CpuBackend.execute(job).unwrap());
        }
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Fast".parse::<PerformanceTier>().unwrap(), PerformanceTier::Fast);
        assert!("turbo".parse::<PerformanceTier>().is_err());
    }
}
