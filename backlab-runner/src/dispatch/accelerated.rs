use std::sync::Arc;

use backlab_core::domain::Bar;
use backlab_core::engine::{SimulationParams, SimulationResult};

use super::{Backend, BackendError, BackendKind};
use crate::runner::{BacktestJob, BacktestResult};

/// An offload device able to run the bar loop.
///
/// Implementations must reproduce the reference engine's output; the
/// analytics always run on the host.
pub trait Accelerator: Send + Sync {
    fn name(&self) -> &str;

    /// Probed before every dispatch.
    fn is_ready(&self) -> bool;

    fn simulate(&self, bars: &[Bar], params: &SimulationParams) -> Result<SimulationResult, String>;
}

/// Backend for an injected [`Accelerator`]. Without a device it reports
/// itself unavailable and the dispatcher never selects it.
#[derive(Clone, Default)]
pub struct AcceleratedBackend {
    device: Option<Arc<dyn Accelerator>>,
}

impl AcceleratedBackend {
    pub fn new(device: Arc<dyn Accelerator>) -> Self {
        Self {
            device: Some(device),
        }
    }

    pub fn without_device() -> Self {
        Self::default()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_deref().map(|d| d.name())
    }
}

impl Backend for AcceleratedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn is_available(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_ready())
    }

    fn execute(&self, job: &BacktestJob) -> Result<BacktestResult, BackendError> {
        let device = self
            .device
            .as_ref()
            .ok_or(BackendError::Unavailable(BackendKind::Accelerated))?;
        let failed = |message: String| BackendError::Failed {
            backend: BackendKind::Accelerated,
            message: format!("{}: {message}", device.name()),
        };

        let sim = device.simulate(&job.bars, &job.params).map_err(failed)?;
        let expected = job.bars.len().saturating_sub(sim.dropped_rows);
        if sim.equity_curve.len() != expected {
            return Err(failed(format!(
                "returned {} equity rows for {expected} tradable bars",
                sim.equity_curve.len()
            )));
        }
        Ok(BacktestResult::from_simulation(job, sim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CpuBackend;
    use backlab_core::data::random_walk;
    use backlab_core::engine::run_simulation;

    /// Stand-in device running the host engine.
    struct HostDevice;

    impl Accelerator for HostDevice {
        fn name(&self) -> &str {
            "host"
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn simulate(
            &self,
            bars: &[Bar],
            params: &SimulationParams,
        ) -> Result<SimulationResult, String> {
            run_simulation(bars, params).map_err(|e| e.to_string())
        }
    }

    /// Device that loses the last row.
    struct TruncatingDevice;

    impl Accelerator for TruncatingDevice {
        fn name(&self) -> &str {
            "truncating"
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn simulate(
            &self,
            bars: &[Bar],
            params: &SimulationParams,
        ) -> Result<SimulationResult, String> {
            let mut sim = run_simulation(bars, params).map_err(|e| e.to_string())?;
            let mut rows = sim.equity_curve.rows().to_vec();
            rows.pop();
            sim.equity_curve = backlab_core::engine::EquityCurve::new(rows);
            Ok(sim)
        }
    }

    fn job() -> BacktestJob {
        BacktestJob::new(random_walk(500, 9), SimulationParams::default())
    }

    #[test]
    fn without_device_is_unavailable() {
        let backend = AcceleratedBackend::without_device();
        assert!(!backend.is_available());
        assert_eq!(
            backend.execute(&job()).unwrap_err(),
            BackendError::Unavailable(BackendKind::Accelerated)
        );
    }

    #[test]
    fn matches_cpu_within_tolerance() {
        let backend = AcceleratedBackend::new(Arc::new(HostDevice));
        assert_eq!(backend.device_name(), Some("host"));
        let job = job();
        let fast = backend.execute(&job).unwrap();
        let reference = CpuBackend.execute(&job).unwrap();
        assert!(fast.metrics.max_relative_diff(&reference.metrics).unwrap() <= 1e-9);
        assert_eq!(fast.trades, reference.trades);
    }

    #[test]
    fn short_output_is_rejected() {
        let backend = AcceleratedBackend::new(Arc::new(TruncatingDevice));
        let err = backend.execute(&job()).unwrap_err();
        assert!(matches!(err, BackendError::Failed { .. }));
        assert!(err.to_string().contains("truncating"));
    }
}
