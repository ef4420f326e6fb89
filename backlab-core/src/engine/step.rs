//! Per-bar transition: `(state, bar) -> (next_state, closed_trade?)`.
//!
//! Order within a bar:
//! 1. Age an open position (`holding_periods += 1`)
//! 2. Evaluate exits: stop-loss, then take-profit, then max holding period
//! 3. Close on an exit trigger or an opposing signal
//! 4. Open when flat and the signal is non-zero
//!
//! Equity marking happens in the loop runner, after the transition.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, ExitReason, PositionSide, Trade};
use crate::engine::cost_model::CostModel;
use crate::engine::state::{SimulationParams, TradeState};

/// Values from outside the trade state that the transition reads.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    /// Most recent marked equity (previous bar close, or initial capital).
    pub marked_equity: f64,
}

/// A position opened on this bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub side: PositionSide,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub shares: u64,
    pub commission: f64,
}

/// Everything one bar produces.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: TradeState,
    pub closed: Option<Trade>,
    pub opened: Option<PositionEntry>,
    /// Commission paid on this bar (exit + entry legs).
    pub commission_paid: f64,
}

/// First matching exit condition in fixed priority order, if any.
pub fn check_exit(state: &TradeState, price: f64, params: &SimulationParams) -> Option<ExitReason> {
    if state.is_flat() {
        return None;
    }
    let move_pct = state.unrealized_return(price);

    if let Some(stop) = params.stop_loss_pct {
        if move_pct <= -stop {
            return Some(ExitReason::StopLoss);
        }
    }
    if let Some(target) = params.take_profit_pct {
        if move_pct >= target {
            return Some(ExitReason::TakeProfit);
        }
    }
    if let Some(max_periods) = params.max_holding_periods {
        if state.holding_periods >= max_periods {
            return Some(ExitReason::MaxHoldingPeriod);
        }
    }
    None
}

/// Advance the trade state by one bar.
pub fn step(
    state: &TradeState,
    bar: &Bar,
    ctx: &StepContext,
    params: &SimulationParams,
) -> StepOutcome {
    let costs = params.cost_model();
    let signal = PositionSide::from_signal(bar.signal);
    let mut next = *state;
    let mut closed = None;
    let mut opened = None;
    let mut commission_paid = 0.0;

    if !next.is_flat() {
        next.holding_periods += 1;

        let exit = check_exit(&next, bar.close, params);
        let reason = exit.or_else(|| {
            (signal == next.position.opposite()).then_some(ExitReason::Signal)
        });

        if let Some(reason) = reason {
            let (flat, trade) = close_position(&next, bar, reason, &costs);
            commission_paid += trade.exit_commission;
            next = flat;
            closed = Some(trade);
        }
    }

    if next.is_flat() && !signal.is_flat() {
        let base = if params.enable_compound {
            ctx.marked_equity
        } else {
            next.cash
        };
        if let Some((entered, entry)) = open_position(&next, bar, signal, base, params, &costs) {
            commission_paid += entry.commission;
            next = entered;
            opened = Some(entry);
        }
    }

    StepOutcome {
        state: next,
        closed,
        opened,
        commission_paid,
    }
}

/// Close the open position at this bar's close, returning the flat state and the trade.
fn close_position(
    state: &TradeState,
    bar: &Bar,
    reason: ExitReason,
    costs: &CostModel,
) -> (TradeState, Trade) {
    let side = state.position;
    let shares = state.shares as f64;
    let exit_price = costs.exit_fill_price(bar.close, side);
    let exit_commission = costs.commission(shares * exit_price);
    let profit = side.sign() * (exit_price - state.entry_price) * shares - exit_commission;
    let cash = state.cash + state.position_value(exit_price) - exit_commission;

    let trade = Trade {
        side,
        entry_timestamp: state.entry_timestamp.unwrap_or(bar.timestamp),
        entry_price: state.entry_price,
        exit_timestamp: bar.timestamp,
        exit_price,
        shares: state.shares,
        entry_commission: state.entry_commission,
        exit_commission,
        profit,
        holding_periods: state.holding_periods,
        exit_reason: reason,
    };

    (TradeState::flat(cash), trade)
}

/// Open `side` sized from `base`. Returns `None` when not even one share is affordable.
///
/// With compounding, `base` is the equity marked at the previous close
/// ([`StepContext::marked_equity`]), so profit realised by a close on this
/// same bar is not sized into the new position until the next entry.
/// Without compounding it is cash after any close on this bar. Either way
/// the allocation is capped by that cash.
fn open_position(
    state: &TradeState,
    bar: &Bar,
    side: PositionSide,
    base: f64,
    params: &SimulationParams,
    costs: &CostModel,
) -> Option<(TradeState, PositionEntry)> {
    let allocatable = (base * params.position_size).min(state.cash);
    if !allocatable.is_finite() || allocatable <= 0.0 {
        return None;
    }

    let entry_price = costs.entry_fill_price(bar.close, side);
    let commission = costs.commission(allocatable);
    let shares = ((allocatable - commission) / entry_price).floor();
    if !shares.is_finite() || shares < 1.0 {
        return None;
    }
    let shares = shares as u64;

    let next = TradeState {
        position: side,
        entry_price,
        entry_timestamp: Some(bar.timestamp),
        entry_commission: commission,
        shares,
        cash: state.cash - shares as f64 * entry_price - commission,
        holding_periods: 0,
    };
    let entry = PositionEntry {
        side,
        timestamp: bar.timestamp,
        price: entry_price,
        shares,
        commission,
    };
    Some((next, entry))
}
