use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{Backend, BackendError, BackendKind};
use crate::runner::{run_backtest, BacktestJob, BacktestResult};

/// Runs independent jobs on a private rayon pool.
///
/// A single job is one partition: the bar loop is path dependent, so one
/// continuous series is never split across workers. Parallelism comes only
/// from [`DistributedBackend::execute_batch`].
pub struct DistributedBackend {
    pool: ThreadPool,
}

impl DistributedBackend {
    pub fn new(workers: usize) -> Result<Self, BackendError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("backlab-dist-{i}"))
            .build()
            .map_err(|e| BackendError::Failed {
                backend: BackendKind::Distributed,
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run every job, one partition each. Results keep the input order.
    pub fn execute_batch(&self, jobs: &[BacktestJob]) -> Vec<Result<BacktestResult, BackendError>> {
        self.pool.install(|| {
            jobs.par_iter()
                .map(|job| run_backtest(job).map_err(BackendError::from))
                .collect()
        })
    }
}

impl Backend for DistributedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    fn execute(&self, job: &BacktestJob) -> Result<BacktestResult, BackendError> {
        self.pool.install(|| run_backtest(job)).map_err(BackendError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CpuBackend;
    use backlab_core::data::random_walk;
    use backlab_core::engine::SimulationParams;

    #[test]
    fn single_job_matches_cpu_exactly() {
        let backend = DistributedBackend::new(3).unwrap();
        assert_eq!(backend.workers(), 3);
        let job = BacktestJob::new(random_walk(800, 6), SimulationParams::default());
        assert_eq!(backend.execute(&job).unwrap(), CpuBackend.execute(&job).unwrap());
    }

    #[test]
    fn batch_keeps_order_and_reports_failures_per_job() {
        let backend = DistributedBackend::new(2).unwrap();
        let jobs = vec![
            BacktestJob::new(random_walk(100, 1), SimulationParams::default()),
            BacktestJob::new(random_walk(1, 2), SimulationParams::default()),
            BacktestJob::new(random_walk(150, 3), SimulationParams::default()),
        ];
        let out = backend.execute_batch(&jobs);
        assert_eq!(out[0].as_ref().unwrap().bar_count, 100);
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().unwrap().bar_count, 150);
    }

    #[test]
    fn zero_workers_rounds_up() {
        assert_eq!(DistributedBackend::new(0).unwrap().workers(), 1);
    }
}
