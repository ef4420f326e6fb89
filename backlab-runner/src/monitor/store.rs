//! Append-only persistence for snapshots and alerts.
//!
//! Stores never update or delete rows. Exactly one thread (the monitor's
//! publisher) writes to a store at a time.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use super::alerts::AlertMessage;
use super::snapshot::RealTimeMetrics;

pub const METRICS_FILE: &str = "metrics_history.csv";
pub const ALERTS_FILE: &str = "alerts_history.csv";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub trait MetricsStore: Send {
    fn append_metrics(&mut self, metrics: &RealTimeMetrics) -> Result<(), StoreError>;
    fn append_alert(&mut self, alert: &AlertMessage) -> Result<(), StoreError>;

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ── In-memory ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tables {
    metrics: Vec<RealTimeMetrics>,
    alerts: Vec<AlertMessage>,
}

/// Store backed by two vectors. Clones share the same tables, so a caller
/// can keep a handle for reading while the monitor owns the writer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<RealTimeMetrics> {
        self.lock().metrics.clone()
    }

    pub fn alerts(&self) -> Vec<AlertMessage> {
        self.lock().alerts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl MetricsStore for MemoryStore {
    fn append_metrics(&mut self, metrics: &RealTimeMetrics) -> Result<(), StoreError> {
        self.lock().metrics.push(metrics.clone());
        Ok(())
    }

    fn append_alert(&mut self, alert: &AlertMessage) -> Result<(), StoreError> {
        self.lock().alerts.push(alert.clone());
        Ok(())
    }
}

// ── CSV files ────────────────────────────────────────────────────────

/// Two append-mode CSV files in one directory. Headers are written only
/// when a file is created, so reopening continues the same tables.
pub struct CsvStore {
    dir: PathBuf,
    metrics: csv::Writer<File>,
    alerts: csv::Writer<File>,
}

impl CsvStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            metrics: append_writer(&dir.join(METRICS_FILE))?,
            alerts: append_writer(&dir.join(ALERTS_FILE))?,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn append_writer(path: &Path) -> Result<csv::Writer<File>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let is_new = file.metadata().map_err(io_err)?.len() == 0;
    Ok(csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file))
}

impl MetricsStore for CsvStore {
    fn append_metrics(&mut self, metrics: &RealTimeMetrics) -> Result<(), StoreError> {
        self.metrics.serialize(metrics)?;
        self.metrics.flush().map_err(|source| StoreError::Io {
            path: self.dir.join(METRICS_FILE),
            source,
        })
    }

    fn append_alert(&mut self, alert: &AlertMessage) -> Result<(), StoreError> {
        self.alerts.serialize(alert)?;
        self.alerts.flush().map_err(|source| StoreError::Io {
            path: self.dir.join(ALERTS_FILE),
            source,
        })
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        for (writer, name) in [(&mut self.metrics, METRICS_FILE), (&mut self.alerts, ALERTS_FILE)] {
            writer.flush().map_err(|source| StoreError::Io {
                path: self.dir.join(name),
                source,
            })?;
        }
        Ok(())
    }
}
