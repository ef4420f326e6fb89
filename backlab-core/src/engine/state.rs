//! Simulation parameters and the per-run trade state value.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::PositionSide;
use crate::engine::cost_model::CostModel;

/// Configuration for a single simulation run.
///
/// The engine does not re-validate these; see the runner's parameter validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub initial_capital: f64,
    /// Fraction of the sizing base allocated to each new position, in (0, 1].
    pub position_size: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub min_commission: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub max_holding_periods: Option<u32>,
    /// Size from marked equity (true) or from remaining cash (false).
    pub enable_compound: bool,
    /// Annual risk-free rate used by the analytics.
    pub risk_free_rate: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            position_size: 0.9,
            commission_pct: 0.001,
            slippage_pct: 0.001,
            min_commission: 0.0,
            stop_loss_pct: None,
            take_profit_pct: None,
            max_holding_periods: None,
            enable_compound: true,
            risk_free_rate: 0.0,
        }
    }
}

impl SimulationParams {
    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.slippage_pct, self.commission_pct, self.min_commission)
    }
}

/// Trade state carried from one bar to the next.
///
/// An immutable value: the reducer in [`crate::engine::step`] returns a new
/// state per bar. Invariant: `position == Flat` ⇔ `shares == 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeState {
    pub position: PositionSide,
    pub entry_price: f64,
    pub entry_timestamp: Option<NaiveDateTime>,
    pub entry_commission: f64,
    pub shares: u64,
    pub cash: f64,
    pub holding_periods: u32,
}

impl TradeState {
    pub fn flat(cash: f64) -> Self {
        Self {
            position: PositionSide::Flat,
            entry_price: 0.0,
            entry_timestamp: None,
            entry_commission: 0.0,
            shares: 0,
            cash,
            holding_periods: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_flat()
    }

    /// Value of the open position marked at `price`.
    ///
    /// Long: `shares · price`. Short positions are collateralised at entry
    /// notional and gain as price falls: `shares · (2·entry − price)`.
    pub fn position_value(&self, price: f64) -> f64 {
        if self.is_flat() {
            return 0.0;
        }
        let shares = self.shares as f64;
        shares * (self.entry_price + self.position.sign() * (price - self.entry_price))
    }

    /// `cash + position_value(price)`.
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position_value(price)
    }

    /// Fractional move since entry, signed by direction (positive = winning).
    pub fn unrealized_return(&self, price: f64) -> f64 {
        if self.is_flat() || self.entry_price <= 0.0 {
            return 0.0;
        }
        self.position.sign() * (price - self.entry_price) / self.entry_price
    }
}

/// Snapshot of a position still open when the series ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: PositionSide,
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub shares: u64,
    pub entry_commission: f64,
    pub holding_periods: u32,
}

impl OpenPosition {
    pub fn from_state(state: &TradeState) -> Option<Self> {
        if state.is_flat() {
            return None;
        }
        Some(Self {
            side: state.position,
            entry_timestamp: state.entry_timestamp?,
            entry_price: state.entry_price,
            shares: state.shares,
            entry_commission: state.entry_commission,
            holding_periods: state.holding_periods,
        })
    }
}
