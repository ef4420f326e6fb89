//! The chunk worker and the publisher thread.
//!
//! The worker is the only producer: it runs chunks and sends
//! [`Publication`]s over a bounded channel. The publisher owns the store
//! and the subscriber senders; it persists first, then fans out.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use backlab_core::domain::Bar;
use backlab_core::engine::SimulationParams;

use super::alerts::{evaluate_thresholds, AlertMessage};
use super::snapshot::{MetricsHistory, RealTimeMetrics};
use super::store::MetricsStore;
use super::{EventKind, EventPayload, MonitorConfig, MonitorEvent, MonitorReport, MonitorState};
use crate::dispatch::Dispatcher;
use crate::runner::BacktestJob;

/// Longest single sleep while pacing, so `stop()` is noticed promptly.
const PACE_SLICE: Duration = Duration::from_millis(50);

/// What the worker hands to the publisher.
pub(crate) enum Publication {
    Snapshot {
        metrics: RealTimeMetrics,
        alerts: Vec<AlertMessage>,
        progress: f64,
    },
    Alert {
        alert: AlertMessage,
        progress: f64,
    },
}

/// `max(min_chunk, len / 100)`.
pub fn chunk_size(len: usize, min_chunk: usize) -> usize {
    min_chunk.max(len / 100).max(1)
}

pub(crate) struct Worker {
    pub dispatcher: Arc<Dispatcher>,
    pub config: MonitorConfig,
    pub bars: Vec<Bar>,
    pub params: SimulationParams,
    pub state: Arc<AtomicU8>,
    pub publish: SyncSender<Publication>,
}

impl Worker {
    fn running(&self) -> bool {
        MonitorState::load(&self.state) == MonitorState::Running
    }

    pub fn run(self) -> MonitorReport {
        let len = self.bars.len();
        let chunk = chunk_size(len, self.config.min_chunk);
        let interval = self.config.update_interval();
        let mut history = MetricsHistory::new(self.config.history_capacity);
        let mut report = MonitorReport::default();
        let mut end = 0;

        info!(bars = len, chunk, "monitor started");

        while end < len && self.running() {
            let started = Instant::now();
            end = (end + chunk).min(len);
            let progress = end as f64 / len as f64;

            let job = BacktestJob::new(self.bars[..end].to_vec(), self.params.clone());
            match self.dispatcher.run(self.config.tier, &job) {
                Ok(dispatched) => {
                    let metrics = RealTimeMetrics::from_result(
                        &dispatched.result,
                        started.elapsed(),
                        Utc::now(),
                    );
                    let alerts = evaluate_thresholds(&metrics, &self.config.thresholds);
                    debug!(
                        end,
                        progress,
                        backend = %dispatched.backend,
                        alerts = alerts.len(),
                        "chunk processed"
                    );
                    report.chunks_processed += 1;
                    report.alerts_raised += alerts.len();
                    history.push(metrics.clone());

                    let sent = self.publish.send(Publication::Snapshot {
                        metrics,
                        alerts,
                        progress,
                    });
                    if sent.is_err() {
                        warn!("publisher gone, stopping monitor");
                        break;
                    }
                }
                Err(e) => {
                    report.chunks_failed += 1;
                    warn!(end, error = %e, "chunk failed, continuing");
                }
            }

            if end < len {
                pace(started, interval, &self.state);
            }
        }

        report.completed = end >= len;
        if report.completed && self.running() {
            let alert = AlertMessage::info(Utc::now(), "monitoring completed");
            report.alerts_raised += 1;
            // The publisher may already be gone; the report still records completion.
            let _ = self.publish.send(Publication::Alert {
                alert,
                progress: 1.0,
            });
        }
        MonitorState::Stopped.store(&self.state);

        info!(
            chunks = report.chunks_processed,
            failed = report.chunks_failed,
            alerts = report.alerts_raised,
            completed = report.completed,
            "monitor stopped"
        );
        report.history = history.into_vec();
        report
    }
}

/// Sleep out the rest of `interval` after a chunk that began at `started`,
/// waking early if the monitor leaves the running state.
fn pace(started: Instant, interval: Duration, state: &AtomicU8) {
    let deadline = started + interval;
    loop {
        if state.load(Ordering::Acquire) != MonitorState::Running as u8 {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(PACE_SLICE));
    }
}

/// Drain publications until the worker hangs up, then hand the store back.
pub(crate) fn publish_loop(
    rx: Receiver<Publication>,
    mut store: Box<dyn MetricsStore>,
    mut subscribers: Vec<SyncSender<MonitorEvent>>,
) -> Box<dyn MetricsStore> {
    for publication in rx {
        let events = match publication {
            Publication::Snapshot {
                metrics,
                alerts,
                progress,
            } => {
                if let Err(e) = store.append_metrics(&metrics) {
                    warn!(error = %e, "failed to persist metrics snapshot");
                }
                persist_alerts(store.as_mut(), &alerts);

                let mut events = vec![MonitorEvent {
                    kind: EventKind::Metrics,
                    payload: EventPayload::Metrics(metrics),
                    progress,
                }];
                if !alerts.is_empty() {
                    events.push(MonitorEvent {
                        kind: EventKind::Alerts,
                        payload: EventPayload::Alerts(alerts),
                        progress,
                    });
                }
                events
            }
            Publication::Alert { alert, progress } => {
                persist_alerts(store.as_mut(), std::slice::from_ref(&alert));
                vec![MonitorEvent {
                    kind: EventKind::Alerts,
                    payload: EventPayload::Alerts(vec![alert]),
                    progress,
                }]
            }
        };

        for event in events {
            fan_out(&mut subscribers, event);
        }
    }

    if let Err(e) = store.flush() {
        warn!(error = %e, "failed to flush metrics store");
    }
    store
}

fn persist_alerts(store: &mut dyn MetricsStore, alerts: &[AlertMessage]) {
    for alert in alerts {
        if let Err(e) = store.append_alert(alert) {
            warn!(error = %e, metric = %alert.metric_name, "failed to persist alert");
        }
    }
}

/// Offer `event` to every subscriber without blocking. Full queues drop the
/// event; disconnected subscribers are removed.
fn fan_out(subscribers: &mut Vec<SyncSender<MonitorEvent>>, event: MonitorEvent) {
    subscribers.retain(|tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(kind = ?event.kind, "subscriber queue full, event dropped");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    });
}
