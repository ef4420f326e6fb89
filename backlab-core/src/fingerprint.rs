//! Content hashing — stable keys for simulation inputs.
//!
//! Fields are fed to blake3 in a fixed order as little-endian bit patterns,
//! so a key computed in one process matches the key computed in any other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::engine::SimulationParams;

/// 32-byte blake3 digest of simulation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental hasher. Each `update_*` call is length- and tag-prefixed so
/// that different field sequences never collide by concatenation.
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    fn tag(&mut self, tag: &[u8], len: usize) {
        self.inner.update(tag);
        self.inner.update(&(len as u64).to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.inner.update(&v.to_bits().to_le_bytes());
    }

    fn opt_f64(&mut self, v: Option<f64>) {
        match v {
            Some(x) => {
                self.inner.update(&[1]);
                self.f64(x);
            }
            None => {
                self.inner.update(&[0]);
            }
        }
    }

    pub fn update_bars(&mut self, bars: &[Bar]) -> &mut Self {
        self.tag(b"bars", bars.len());
        for bar in bars {
            self.inner
                .update(&bar.timestamp.and_utc().timestamp_millis().to_le_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                self.f64(v);
            }
            self.inner.update(&bar.signal.to_le_bytes());
        }
        self
    }

    pub fn update_params(&mut self, params: &SimulationParams) -> &mut Self {
        self.tag(b"params", 10);
        for v in [
            params.initial_capital,
            params.position_size,
            params.commission_pct,
            params.slippage_pct,
            params.min_commission,
        ] {
            self.f64(v);
        }
        self.opt_f64(params.stop_loss_pct);
        self.opt_f64(params.take_profit_pct);
        self.opt_f64(params.max_holding_periods.map(f64::from));
        self.inner.update(&[params.enable_compound as u8]);
        self.f64(params.risk_free_rate);
        self
    }

    pub fn update_f64s(&mut self, values: &[f64]) -> &mut Self {
        self.tag(b"f64s", values.len());
        for &v in values {
            self.f64(v);
        }
        self
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.tag(b"str", s.len());
        self.inner.update(s.as_bytes());
        self
    }

    pub fn finish(&self) -> ContentHash {
        ContentHash(*self.inner.finalize().as_bytes())
    }
}

/// Hash of a bar series plus parameters.
pub fn simulation_key(bars: &[Bar], params: &SimulationParams) -> ContentHash {
    ContentHasher::new()
        .update_bars(bars)
        .update_params(params)
        .finish()
}
