//! Point-in-time metric snapshots and the bounded history ring.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::BacktestResult;

/// Metrics for the data processed so far. Field order is the persisted
/// column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealTimeMetrics {
    pub timestamp: DateTime<Utc>,
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub current_equity: f64,
    pub current_position: i8,
    pub execution_time_ms: f64,
}

impl RealTimeMetrics {
    pub fn from_result(
        result: &BacktestResult,
        execution_time: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let m = &result.metrics;
        let last = result.equity_curve.rows().last();
        Self {
            timestamp,
            total_return: m.total_return,
            annualized_return: m.annualized_return,
            volatility: m.volatility,
            sharpe: m.sharpe,
            sortino: m.sortino,
            calmar: m.calmar,
            max_drawdown: m.max_drawdown,
            var_95: m.var_95,
            cvar_95: m.cvar_95,
            win_rate: m.win_rate,
            profit_factor: m.profit_factor,
            total_trades: m.total_trades,
            current_equity: last.map_or(0.0, |r| r.equity),
            current_position: last.map_or(0, |r| r.position),
            execution_time_ms: execution_time.as_secs_f64() * 1_000.0,
        }
    }

    /// Value of a numeric field by name.
    ///
    /// Trade statistics are `None` until at least one trade has closed, so
    /// they cannot raise alerts on an empty trade log.
    pub fn value(&self, name: &str) -> Option<f64> {
        let has_trades = self.total_trades > 0;
        let v = match name {
            "total_return" => self.total_return,
            "annualized_return" => self.annualized_return,
            "volatility" => self.volatility,
            "sharpe" => self.sharpe,
            "sortino" => self.sortino,
            "calmar" => self.calmar,
            "max_drawdown" => self.max_drawdown,
            "var_95" => self.var_95,
            "cvar_95" => self.cvar_95,
            "win_rate" if has_trades => self.win_rate,
            "profit_factor" if has_trades => self.profit_factor,
            "total_trades" => self.total_trades as f64,
            "current_equity" => self.current_equity,
            "current_position" => f64::from(self.current_position),
            "execution_time_ms" => self.execution_time_ms,
            _ => return None,
        };
        Some(v)
    }
}

/// Ring buffer of the most recent snapshots.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    buf: VecDeque<RealTimeMetrics>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, discarding the oldest snapshot when full.
    pub fn push(&mut self, snapshot: RealTimeMetrics) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&RealTimeMetrics> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &RealTimeMetrics> {
        self.buf.iter()
    }

    pub fn into_vec(self) -> Vec<RealTimeMetrics> {
        self.buf.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{run_backtest, BacktestJob};
    use backlab_core::data::random_walk;
    use backlab_core::engine::SimulationParams;

    #[test]
    fn snapshot_copies_run_metrics() {
        let result =
            run_backtest(&BacktestJob::new(random_walk(300, 5), SimulationParams::default()))
                .unwrap();
        let snap = RealTimeMetrics::from_result(&result, Duration::from_millis(12), Utc::now());
        assert_eq!(snap.sharpe, result.metrics.sharpe);
        assert_eq!(snap.total_trades, result.trades.len());
        assert_eq!(
            Some(snap.current_equity),
            result.equity_curve.final_equity()
        );
        assert!((snap.execution_time_ms - 12.0).abs() < 1e-9);
    }

    #[test]
    fn value_lookup() {
        let snap = RealTimeMetrics {
            max_drawdown: 0.2,
            win_rate: 0.5,
            ..RealTimeMetrics::default()
        };
        assert_eq!(snap.value("max_drawdown"), Some(0.2));
        assert_eq!(snap.value("win_rate"), None);
        assert_eq!(snap.value("nope"), None);
        let traded = RealTimeMetrics {
            total_trades: 3,
            ..snap
        };
        assert_eq!(traded.value("win_rate"), Some(0.5));
    }

    #[test]
    fn history_is_bounded() {
        let mut history = MetricsHistory::new(3);
        for i in 0..5 {
            history.push(RealTimeMetrics {
                total_trades: i,
                ..RealTimeMetrics::default()
            });
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().total_trades, 4);
        let kept: Vec<usize> = history.iter().map(|m| m.total_trades).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }
}
