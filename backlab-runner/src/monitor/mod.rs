//! Real-time monitor: replays a bar series in growing chunks, snapshots the
//! metrics after each chunk, and raises tiered alerts.
//!
//! Threads:
//! - **worker**: runs chunks through the [`Dispatcher`] and sends results on
//!   a bounded channel. Owns the metrics history.
//! - **publisher**: sole writer of the [`MetricsStore`]; persists each
//!   snapshot and its alerts, then offers them to subscribers.
//!
//! Nothing else is shared between threads except the state flag, which the
//! worker checks between chunks.

pub mod alerts;
pub mod snapshot;
pub mod store;
mod worker;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use backlab_core::domain::Bar;
use backlab_core::engine::{SimulationParams, MIN_BARS};

pub use alerts::{
    evaluate_thresholds, AlertCategory, AlertLevel, AlertMessage, AlertThresholds,
    ThresholdConfig, ThresholdDirection,
};
pub use snapshot::{MetricsHistory, RealTimeMetrics};
pub use store::{CsvStore, MemoryStore, MetricsStore, StoreError};
pub use worker::chunk_size;

use crate::dispatch::{Dispatcher, PerformanceTier};
use worker::{publish_loop, Publication, Worker};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("need at least {required} bars, got {actual}")]
    NotEnoughBars { required: usize, actual: usize },

    #[error("metrics store was lost by a previous run")]
    StoreUnavailable,

    #[error("a detached session is still draining into the metrics store")]
    PreviousSessionDraining,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MonitorState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

impl MonitorState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    pub(crate) fn load(flag: &AtomicU8) -> Self {
        Self::from_u8(flag.load(Ordering::Acquire))
    }

    pub(crate) fn store(self, flag: &AtomicU8) {
        flag.store(self as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Target wall time per chunk; the worker sleeps out the remainder.
    pub update_interval_ms: u64,
    /// Smallest chunk size in bars.
    pub min_chunk: usize,
    pub history_capacity: usize,
    /// Capacity of the worker → publisher channel.
    pub channel_capacity: usize,
    /// How long `stop()` waits for the worker before detaching it.
    pub join_timeout_ms: u64,
    pub tier: PerformanceTier,
    pub thresholds: AlertThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 1_000,
            min_chunk: 100,
            history_capacity: 1_000,
            channel_capacity: 64,
            join_timeout_ms: 5_000,
            tier: PerformanceTier::Standard,
            thresholds: AlertThresholds::default(),
        }
    }
}

impl MonitorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Metrics,
    Alerts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Metrics(RealTimeMetrics),
    Alerts(Vec<AlertMessage>),
}

/// One message on a subscriber channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: EventPayload,
    /// Fraction of bars processed, in [0, 1].
    pub progress: f64,
}

/// Summary returned by the worker when it exits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorReport {
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub alerts_raised: usize,
    /// True when every bar was processed (as opposed to an early stop).
    pub completed: bool,
    /// The retained snapshot history, oldest first.
    pub history: Vec<RealTimeMetrics>,
}

struct Session {
    worker: JoinHandle<MonitorReport>,
    publisher: JoinHandle<Box<dyn MetricsStore>>,
    done: Receiver<()>,
}

pub struct RealTimeMonitor {
    dispatcher: Arc<Dispatcher>,
    config: MonitorConfig,
    store: Option<Box<dyn MetricsStore>>,
    subscribers: Vec<SyncSender<MonitorEvent>>,
    state: Arc<AtomicU8>,
    session: Option<Session>,
    /// Publisher of a session that missed its stop deadline. It still owns
    /// the store and hands it back when the worker finally exits.
    detached: Option<JoinHandle<Box<dyn MetricsStore>>>,
}

impl RealTimeMonitor {
    pub fn new(dispatcher: Arc<Dispatcher>, config: MonitorConfig, store: Box<dyn MetricsStore>) -> Self {
        Self {
            dispatcher,
            config,
            store: Some(store),
            subscribers: Vec::new(),
            state: Arc::new(AtomicU8::new(MonitorState::Idle as u8)),
            session: None,
            detached: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::load(&self.state)
    }

    /// Register a subscriber with a queue of `capacity` events. Subscribers
    /// join at the next `start()`; a slow subscriber loses events rather
    /// than stalling the monitor.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        self.subscribers.push(tx);
        rx
    }

    /// Begin monitoring `bars`. Fails if a session is still running.
    ///
    /// A finished session that was never joined is reclaimed first.
    pub fn start(&mut self, bars: Vec<Bar>, params: SimulationParams) -> Result<(), MonitorError> {
        if bars.len() < MIN_BARS {
            return Err(MonitorError::NotEnoughBars {
                required: MIN_BARS,
                actual: bars.len(),
            });
        }
        if self.session.is_some() {
            if self.state() == MonitorState::Running {
                return Err(MonitorError::AlreadyRunning);
            }
            self.join(self.config.join_timeout(), true);
        }
        self.reclaim_detached()?;
        let store = self.store.take().ok_or(MonitorError::StoreUnavailable)?;

        // A fresh flag per session: a detached worker from an earlier session
        // keeps seeing its own stopped flag.
        self.state = Arc::new(AtomicU8::new(MonitorState::Running as u8));

        let (pub_tx, pub_rx) = mpsc::sync_channel::<Publication>(self.config.channel_capacity.max(1));
        let subscribers = self.subscribers.clone();
        let publisher = match thread::Builder::new()
            .name("backlab-publisher".into())
            .spawn(move || publish_loop(pub_rx, store, subscribers))
        {
            Ok(handle) => handle,
            Err(source) => {
                MonitorState::Stopped.store(&self.state);
                return Err(MonitorError::Spawn {
                    name: "publisher",
                    source,
                });
            }
        };

        let (done_tx, done_rx) = mpsc::channel();
        let worker = Worker {
            dispatcher: Arc::clone(&self.dispatcher),
            config: self.config.clone(),
            bars,
            params,
            state: Arc::clone(&self.state),
            publish: pub_tx,
        };
        let spawned = thread::Builder::new()
            .name("backlab-monitor".into())
            .spawn(move || {
                let report = worker.run();
                let _ = done_tx.send(());
                report
            });
        let worker = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                // The closure (and its channel sender) was dropped, so the
                // publisher exits and returns the store.
                MonitorState::Stopped.store(&self.state);
                if let Ok(store) = publisher.join() {
                    self.store = Some(store);
                }
                return Err(MonitorError::Spawn {
                    name: "monitor",
                    source,
                });
            }
        };

        info!("monitor session started");
        self.session = Some(Session {
            worker,
            publisher,
            done: done_rx,
        });
        Ok(())
    }

    /// Request a stop and join the worker within the configured timeout.
    ///
    /// Returns `None` when there is no session, or when the worker did not
    /// exit in time (it is then detached and logged).
    pub fn stop(&mut self) -> Option<MonitorReport> {
        if self.state() == MonitorState::Running {
            MonitorState::Stopped.store(&self.state);
        }
        self.join(self.config.join_timeout(), true)
    }

    /// Wait up to `timeout` for the session to finish on its own.
    ///
    /// On timeout the session keeps running and `None` is returned.
    pub fn wait(&mut self, timeout: Duration) -> Option<MonitorReport> {
        self.join(timeout, false)
    }

    /// Take the store back from a detached publisher once it has exited.
    fn reclaim_detached(&mut self) -> Result<(), MonitorError> {
        let Some(publisher) = self.detached.take() else {
            return Ok(());
        };
        if !publisher.is_finished() {
            self.detached = Some(publisher);
            return Err(MonitorError::PreviousSessionDraining);
        }
        match publisher.join() {
            Ok(store) => {
                info!("reclaimed metrics store from detached session");
                self.store = Some(store);
            }
            Err(_) => warn!("detached publisher panicked, metrics store lost"),
        }
        Ok(())
    }

    fn join(&mut self, timeout: Duration, detach_on_timeout: bool) -> Option<MonitorReport> {
        let session = self.session.take()?;
        match session.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                if detach_on_timeout {
                    warn!(?timeout, "monitor worker did not stop in time, detaching");
                    self.detached = Some(session.publisher);
                } else {
                    self.session = Some(session);
                }
                return None;
            }
        }

        let report = match session.worker.join() {
            Ok(report) => Some(report),
            Err(_) => {
                warn!("monitor worker panicked");
                MonitorState::Stopped.store(&self.state);
                None
            }
        };
        match session.publisher.join() {
            Ok(store) => self.store = Some(store),
            Err(_) => warn!("publisher thread panicked, metrics store lost"),
        }
        report
    }
}

impl Drop for RealTimeMonitor {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.stop();
        }
    }
}
