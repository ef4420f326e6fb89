//! Bar — the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV bar with an optional strategy signal.
///
/// `signal` is -1, 0 or 1. Bars built from a table with a missing or NaN
/// signal value carry 0 (no instruction).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub signal: i8,
}

impl Bar {
    /// Returns true if any OHLC field is NaN or infinite (void bar).
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Prices the engine can execute against: finite and strictly positive.
    pub fn is_tradable(&self) -> bool {
        !self.is_void() && self.open > 0.0 && self.high > 0.0 && self.low > 0.0 && self.close > 0.0
    }

    /// Basic OHLCV sanity check: high >= max(open, close), low <= min(open, close).
    pub fn is_sane(&self) -> bool {
        if !self.is_tradable() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.volume >= 0.0
    }
}

/// Map a raw signal value onto {-1, 0, 1}. NaN and zero map to 0.
pub fn normalize_signal(raw: f64) -> i8 {
    if raw.is_nan() || raw == 0.0 {
        0
    } else if raw > 0.0 {
        1
    } else {
        -1
    }
}
