//! Bar-by-bar simulation loop.
//!
//! Per bar:
//! 1. Transition the trade state (exits, then entries) via [`step`]
//! 2. Mark equity at the close
//! 3. Record the equity row and any closed trade
//!
//! The loop is a pure function of `(bars, params)`: the same input always
//! yields a byte-identical result.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Bar, Trade};
use crate::engine::equity::{EquityCurve, EquityRow};
use crate::engine::state::{OpenPosition, SimulationParams, TradeState};
use crate::engine::step::{step, StepContext};
use crate::error::DataError;

/// Fewest usable bars a simulation accepts.
pub const MIN_BARS: usize = 2;

/// Output of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub equity_curve: EquityCurve,
    pub trades: Vec<Trade>,
    /// Position still open at the last bar, marked but not closed.
    pub open_position: Option<OpenPosition>,
    /// Input rows discarded for non-finite or non-positive prices.
    pub dropped_rows: usize,
}

impl SimulationResult {
    pub fn total_commission(&self) -> f64 {
        self.equity_curve.rows().iter().map(|r| r.commission).sum()
    }
}

/// Run a full simulation over `bars`.
///
/// Rows whose prices are not finite and positive are dropped with a warning.
/// Errors when timestamps are not strictly increasing or fewer than
/// [`MIN_BARS`] usable rows remain.
pub fn run_simulation(
    bars: &[Bar],
    params: &SimulationParams,
) -> Result<SimulationResult, DataError> {
    check_monotonic(bars)?;

    let usable: Vec<&Bar> = bars.iter().filter(|b| b.is_tradable()).collect();
    let dropped_rows = bars.len() - usable.len();
    if dropped_rows > 0 {
        warn!(
            dropped = dropped_rows,
            total = bars.len(),
            "dropping bars with non-finite or non-positive prices"
        );
    }
    if usable.len() < MIN_BARS {
        return Err(DataError::InsufficientRows {
            required: MIN_BARS,
            actual: usable.len(),
        });
    }

    let mut state = TradeState::flat(params.initial_capital);
    let mut marked_equity = params.initial_capital;
    let mut prev_equity: Option<f64> = None;
    let mut rows = Vec::with_capacity(usable.len());
    let mut trades = Vec::new();

    for bar in usable {
        let outcome = step(&state, bar, &StepContext { marked_equity }, params);
        state = outcome.state;

        let equity = state.equity(bar.close);
        let returns = match prev_equity {
            Some(prev) if prev > 0.0 => (equity - prev) / prev,
            _ => 0.0,
        };

        rows.push(EquityRow {
            timestamp: bar.timestamp,
            close: bar.close,
            signal: bar.signal,
            position: state.position.as_i8(),
            entry_price: outcome.opened.map(|e| e.price),
            entry_timestamp: outcome.opened.map(|e| e.timestamp),
            exit_price: outcome.closed.as_ref().map(|t| t.exit_price),
            exit_timestamp: outcome.closed.as_ref().map(|t| t.exit_timestamp),
            holding_periods: state.holding_periods,
            exit_reason: outcome.closed.as_ref().map(|t| t.exit_reason),
            capital: state.cash,
            equity,
            returns,
            trade_profit: outcome.closed.as_ref().map_or(0.0, |t| t.profit),
            commission: outcome.commission_paid,
            shares: state.shares,
        });

        if let Some(trade) = outcome.closed {
            trades.push(trade);
        }
        prev_equity = Some(equity);
        marked_equity = equity;
    }

    debug!(
        bars = rows.len(),
        trades = trades.len(),
        final_equity = marked_equity,
        "simulation complete"
    );

    Ok(SimulationResult {
        equity_curve: EquityCurve::new(rows),
        trades,
        open_position: OpenPosition::from_state(&state),
        dropped_rows,
    })
}

fn check_monotonic(bars: &[Bar]) -> Result<(), DataError> {
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DataError::NonMonotonicIndex { row: i + 1 });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionSide;
    use chrono::{Duration, NaiveDate};

    fn bars(closes: &[f64], signals: &[i8]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .zip(signals)
            .enumerate()
            .map(|(i, (&c, &s))| Bar {
                timestamp: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1_000.0,
                signal: s,
            })
            .collect()
    }

    fn frictionless() -> SimulationParams {
        SimulationParams {
            initial_capital: 10_000.0,
            position_size: 1.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            ..SimulationParams::default()
        }
    }

    #[test]
    fn all_zero_signals_keep_equity_flat() {
        let data = bars(&[100.0, 101.0, 99.0, 102.0], &[0, 0, 0, 0]);
        let result = run_simulation(&data, &frictionless()).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.equity().iter().all(|&e| e == 10_000.0));
        assert!(result.equity_curve.returns().iter().all(|&r| r == 0.0));
    }

    #[test]
    fn first_return_is_zero() {
        let data = bars(&[100.0, 110.0], &[1, 0]);
        let result = run_simulation(&data, &frictionless()).unwrap();
        assert_eq!(result.equity_curve.returns()[0], 0.0);
        assert!((result.equity_curve.returns()[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn open_position_is_reported_at_end() {
        let data = bars(&[100.0, 105.0, 110.0], &[1, 0, 0]);
        let result = run_simulation(&data, &frictionless()).unwrap();
        let open = result.open_position.expect("still long");
        assert_eq!(open.side, PositionSide::Long);
        assert_eq!(open.holding_periods, 2);
        assert_eq!(result.equity_curve.final_equity(), Some(11_000.0));
    }

    #[test]
    fn invalid_prices_are_dropped_and_counted() {
        let data = bars(&[100.0, f64::NAN, -5.0, 101.0], &[0, 0, 0, 0]);
        let result = run_simulation(&data, &frictionless()).unwrap();
        assert_eq!(result.dropped_rows, 2);
        assert_eq!(result.equity_curve.len(), 2);
    }

    #[test]
    fn too_few_usable_rows_is_an_error() {
        let data = bars(&[100.0, 0.0, 0.0], &[0, 0, 0]);
        let err = run_simulation(&data, &frictionless()).unwrap_err();
        assert_eq!(
            err,
            DataError::InsufficientRows {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn duplicate_timestamp_is_an_error() {
        let mut data = bars(&[100.0, 101.0, 102.0], &[0, 0, 0]);
        data[2].timestamp = data[1].timestamp;
        let err = run_simulation(&data, &frictionless()).unwrap_err();
        assert_eq!(err, DataError::NonMonotonicIndex { row: 2 });
    }

    #[test]
    fn row_commission_sums_to_trade_commissions() {
        let p = SimulationParams {
            commission_pct: 0.001,
            slippage_pct: 0.001,
            ..frictionless()
        };
        let data = bars(&[100.0, 105.0, 103.0, 108.0, 104.0], &[1, -1, 1, -1, 0]);
        let result = run_simulation(&data, &p).unwrap();
        let from_trades: f64 = result.trades.iter().map(Trade::commission).sum::<f64>()
            + result.open_position.map_or(0.0, |o| o.entry_commission);
        assert!((result.total_commission() - from_trades).abs() < 1e-9);
    }
}
