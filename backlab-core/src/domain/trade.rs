//! Trade — a completed round trip, plus the position side and exit reason enums.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the (single) open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionSide {
    /// -1.0, 0.0 or 1.0.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Flat => 0.0,
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    /// -1, 0 or 1, matching the signal encoding.
    pub fn as_i8(self) -> i8 {
        match self {
            PositionSide::Flat => 0,
            PositionSide::Long => 1,
            PositionSide::Short => -1,
        }
    }

    pub fn from_signal(signal: i8) -> Self {
        match signal.signum() {
            1 => PositionSide::Long,
            -1 => PositionSide::Short,
            _ => PositionSide::Flat,
        }
    }

    pub fn is_flat(self) -> bool {
        self == PositionSide::Flat
    }

    /// The side a signal must point to in order to close this position.
    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Flat => PositionSide::Flat,
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

/// Why a position was closed. Exactly one reason is recorded per trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    MaxHoldingPeriod,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::MaxHoldingPeriod => "max_holding_period",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete round-trip trade record: entry → exit. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: PositionSide,

    // ── Entry ──
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_timestamp: NaiveDateTime,
    pub exit_price: f64,

    // ── Size ──
    pub shares: u64,

    // ── Costs and PnL ──
    pub entry_commission: f64,
    pub exit_commission: f64,
    /// Directional price delta × shares − exit commission.
    pub profit: f64,

    pub holding_periods: u32,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Entry plus exit commission.
    pub fn commission(&self) -> f64 {
        self.entry_commission + self.exit_commission
    }

    /// Profit after both commissions.
    pub fn net_of_all_costs(&self) -> f64 {
        self.profit - self.entry_commission
    }

    /// Return on the trade as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.shares as f64;
        if notional == 0.0 {
            return 0.0;
        }
        self.profit / notional
    }

    pub fn is_winner(&self) -> bool {
        self.profit > 0.0
    }
}
