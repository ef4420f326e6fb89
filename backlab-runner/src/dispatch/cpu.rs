use super::{Backend, BackendError, BackendKind};
use crate::runner::{run_backtest, BacktestJob, BacktestResult};

/// Reference backend: the sequential engine on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn execute(&self, job: &BacktestJob) -> Result<BacktestResult, BackendError> {
        Ok(run_backtest(job)?)
    }
}
