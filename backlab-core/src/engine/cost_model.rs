//! Cost model — slippage and commission calculation.
//!
//! Slippage is directional: entering a long or covering a short pays more,
//! entering a short or selling a long receives less.
//! Commission is a percentage of notional with a per-fill minimum.

use crate::domain::PositionSide;

/// Cost model for execution friction (slippage + commission).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Slippage as a fraction of price, applied adversely.
    pub slippage_pct: f64,
    /// Commission as a fraction of notional per fill.
    pub commission_pct: f64,
    /// Floor applied to every fill's commission.
    pub min_commission: f64,
}

impl CostModel {
    pub fn new(slippage_pct: f64, commission_pct: f64, min_commission: f64) -> Self {
        Self {
            slippage_pct,
            commission_pct,
            min_commission,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Fill price when opening `side` at `price`.
    ///
    /// Long entries buy above the quote, short entries sell below it.
    pub fn entry_fill_price(&self, price: f64, side: PositionSide) -> f64 {
        price * (1.0 + side.sign() * self.slippage_pct)
    }

    /// Fill price when closing `side` at `price` (direction reversed from entry).
    pub fn exit_fill_price(&self, price: f64, side: PositionSide) -> f64 {
        price * (1.0 - side.sign() * self.slippage_pct)
    }

    /// `max(notional · commission_pct, min_commission)`.
    pub fn commission(&self, notional: f64) -> f64 {
        (notional.abs() * self.commission_pct).max(self.min_commission)
    }

    /// Cost of one full round trip as a fraction of notional.
    pub fn round_trip_pct(&self) -> f64 {
        2.0 * (self.commission_pct + self.slippage_pct)
    }
}
