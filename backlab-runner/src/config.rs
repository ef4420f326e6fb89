//! TOML run configuration.
//!
//! Every section is optional; an empty file yields the defaults.
//!
//! ```toml
//! [simulation]
//! initial_capital = 50000.0
//! stop_loss_pct = 0.05
//!
//! [data]
//! signal_column = "entry"
//!
//! [dispatch]
//! tier = "fast"
//! workers = 4
//!
//! [monitor]
//! update_interval_ms = 250
//!
//! [thresholds.max_drawdown]
//! direction = "above"
//! warning = 0.08
//! critical = 0.15
//! emergency = 0.25
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use backlab_core::data::DEFAULT_SIGNAL_COLUMN;
use backlab_core::engine::SimulationParams;

use crate::dispatch::{
    BackendError, CachedBackend, DispatchThresholds, Dispatcher, DistributedBackend,
    PerformanceTier, TtlLruCache,
};
use crate::monitor::{AlertThresholds, MonitorConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub simulation: SimulationParams,
    pub data: DataConfig,
    pub dispatch: DispatchConfig,
    pub monitor: MonitorConfig,
    /// Per-metric overrides laid over the default alert thresholds.
    pub thresholds: AlertThresholds,
}

impl BacktestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Monitor settings with the threshold overrides applied.
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut monitor = self.monitor.clone();
        monitor.thresholds.merge(self.thresholds.clone());
        monitor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub signal_column: String,
    pub path: Option<PathBuf>,
    pub benchmark: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            signal_column: DEFAULT_SIGNAL_COLUMN.to_string(),
            path: None,
            benchmark: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub tier: PerformanceTier,
    #[serde(flatten)]
    pub thresholds: DispatchThresholds,
    /// Worker threads for the distributed backend; `None` disables it.
    pub workers: Option<usize>,
    /// Result cache entries; 0 disables the cached backend.
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tier: PerformanceTier::Standard,
            thresholds: DispatchThresholds::default(),
            workers: None,
            cache_capacity: 64,
            cache_ttl_secs: 3_600,
        }
    }
}

impl DispatchConfig {
    /// Build a dispatcher with the configured backends.
    pub fn build(&self) -> Result<Dispatcher, BackendError> {
        let mut dispatcher = Dispatcher::new(self.thresholds.clone());
        if let Some(workers) = self.workers {
            dispatcher = dispatcher.with_distributed(Arc::new(DistributedBackend::new(workers)?));
        }
        if self.cache_capacity > 0 {
            let cache = TtlLruCache::new(self.cache_capacity, Duration::from_secs(self.cache_ttl_secs));
            dispatcher = dispatcher.with_cached(Arc::new(CachedBackend::new(Arc::new(cache))));
        }
        Ok(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::BackendKind;
    use crate::monitor::AlertLevel;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(BacktestConfig::from_toml("").unwrap(), BacktestConfig::default());
    }

    #[test]
    fn sections_parse() {
        let cfg = BacktestConfig::from_toml(
            r#"
            [simulation]
            initial_capital = 50000.0
            enable_compound = false
            stop_loss_pct = 0.05

            [data]
            signal_column = "entry"

            [dispatch]
            tier = "maximum"
            maximum_min_rows = 500
            workers = 2

            [monitor]
            update_interval_ms = 250

            [thresholds.max_drawdown]
            direction = "above"
            warning = 0.08
            critical = 0.15
            emergency = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(cfg.simulation.initial_capital, 50_000.0);
        assert!(!cfg.simulation.enable_compound);
        assert_eq!(cfg.simulation.stop_loss_pct, Some(0.05));
        assert_eq!(cfg.simulation.position_size, 0.9);
        assert_eq!(cfg.data.signal_column, "entry");
        assert_eq!(cfg.dispatch.tier, PerformanceTier::Maximum);
        assert_eq!(cfg.dispatch.thresholds.maximum_min_rows, 500);
        assert_eq!(cfg.dispatch.thresholds.fast_min_rows, 100_000);
        assert_eq!(cfg.monitor.update_interval_ms, 250);

        let monitor = cfg.monitor_config();
        let dd = monitor.thresholds.get("max_drawdown").unwrap();
        assert_eq!(dd.critical, Some(0.15));
        assert!(monitor.thresholds.get("sharpe").is_some());
        assert_eq!(dd.crossed(0.2).map(|(l, _)| l), Some(AlertLevel::Critical));
    }

    #[test]
    fn unknown_tier_is_a_parse_error() {
        let err = BacktestConfig::from_toml("[dispatch]\ntier = \"turbo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn dispatcher_is_built_from_config() {
        let cfg = DispatchConfig {
            workers: Some(2),
            thresholds: DispatchThresholds {
                fast_min_rows: 10,
                maximum_min_rows: 10,
            },
            ..DispatchConfig::default()
        };
        let d = cfg.build().unwrap();
        assert_eq!(d.select(PerformanceTier::Fast, 100).kind(), BackendKind::Distributed);

        let cfg = DispatchConfig {
            thresholds: cfg.thresholds.clone(),
            ..DispatchConfig::default()
        };
        let d = cfg.build().unwrap();
        assert_eq!(d.select(PerformanceTier::Fast, 100).kind(), BackendKind::Cached);
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backlab.toml");
        std::fs::write(&path, "[simulation]\nposition_size = 0.5\n").unwrap();
        let cfg = BacktestConfig::from_file(&path).unwrap();
        assert_eq!(cfg.simulation.position_size, 0.5);
        assert!(matches!(
            BacktestConfig::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
