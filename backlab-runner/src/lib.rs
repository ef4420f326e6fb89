//! BackLab Runner — analytics, validation, dispatch and monitoring.
//!
//! This crate builds on `backlab-core` to provide:
//! - Risk and performance metrics over an equity curve and trade log
//! - Advisory validation of bar tables, parameters and results
//! - A backend dispatcher with a content-addressed result cache
//! - A real-time monitor that replays bars in chunks and raises alerts
//! - TOML configuration

pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod monitor;
pub mod relative;
pub mod runner;
pub mod tail_metrics;
pub mod validator;

pub use config::{BacktestConfig, ConfigError, DataConfig, DispatchConfig};
pub use dispatch::{
    Backend, BackendError, BackendKind, Dispatched, Dispatcher, PerformanceTier,
};
pub use metrics::RiskMetrics;
pub use monitor::{
    AlertLevel, AlertMessage, AlertThresholds, MonitorConfig, MonitorError, MonitorEvent,
    RealTimeMetrics, RealTimeMonitor,
};
pub use relative::{BenchmarkSeries, RelativeMetrics};
pub use runner::{run_backtest, run_backtest_from_frame, BacktestJob, BacktestResult, RunError};
pub use tail_metrics::TailMetrics;
pub use validator::{
    validate_data, validate_parameters, validate_results, QualityLevel, ValidationResult,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: results and events cross thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<BacktestJob>();
        require_sync::<BacktestJob>();
        require_send::<BacktestResult>();
        require_sync::<BacktestResult>();
        require_send::<ValidationResult>();
        require_sync::<ValidationResult>();

        // Dispatch
        require_send::<Dispatcher>();
        require_sync::<Dispatcher>();
        require_send::<dispatch::TtlLruCache>();
        require_sync::<dispatch::TtlLruCache>();

        // Monitor
        require_send::<MonitorEvent>();
        require_sync::<MonitorEvent>();
        require_send::<RealTimeMonitor>();
        require_send::<monitor::CsvStore>();
        require_send::<monitor::MemoryStore>();
        require_sync::<monitor::MemoryStore>();
    }
}
