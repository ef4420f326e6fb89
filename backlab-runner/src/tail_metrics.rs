//! Tail risk metrics — VaR, CVaR, skewness, kurtosis, tail ratio.
//!
//! All functions are pure: per-bar returns in, scalar out.

use serde::{Deserialize, Serialize};

use crate::metrics::{mean_f64, ratio, std_dev};

/// Distribution-shape statistics of a return series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TailMetrics {
    /// 5th percentile of returns (typically negative).
    pub var_95: f64,
    /// 1st percentile of returns.
    pub var_99: f64,
    /// Mean of returns at or below `var_95`.
    pub cvar_95: f64,
    pub cvar_99: f64,
    /// Third standardized moment. Negative = heavier left tail.
    pub skewness: f64,
    /// Excess kurtosis (fourth standardized moment − 3).
    pub kurtosis: f64,
    /// `|P95 / P5|`.
    pub tail_ratio: f64,
}

pub fn compute_tail_metrics(returns: &[f64]) -> TailMetrics {
    if returns.is_empty() {
        return TailMetrics::default();
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let var_95 = percentile_sorted(&sorted, 5.0);
    let var_99 = percentile_sorted(&sorted, 1.0);

    TailMetrics {
        var_95,
        var_99,
        cvar_95: cvar(&sorted, var_95),
        cvar_99: cvar(&sorted, var_99),
        skewness: skewness(returns),
        kurtosis: excess_kurtosis(returns),
        tail_ratio: ratio(percentile_sorted(&sorted, 95.0), var_95).abs(),
    }
}

/// Percentile `p` (0–100) by linear interpolation between order statistics.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(&sorted, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Mean of the returns at or below `var`.
fn cvar(sorted: &[f64], var: f64) -> f64 {
    let tail: Vec<f64> = sorted.iter().copied().take_while(|&r| r <= var).collect();
    if tail.is_empty() {
        return var;
    }
    mean_f64(&tail)
}

/// skew = (1/n) · Σ((xᵢ − mean) / std)³
fn skewness(returns: &[f64]) -> f64 {
    let n = returns.len() as f64;
    let mean = mean_f64(returns);
    let std = std_dev(returns);

    if std < 1e-15 {
        return 0.0;
    }

    returns
        .iter()
        .map(|r| ((r - mean) / std).powi(3))
        .sum::<f64>()
        / n
}

/// kurt = (1/n) · Σ((xᵢ − mean) / std)⁴ − 3
fn excess_kurtosis(returns: &[f64]) -> f64 {
    let n = returns.len() as f64;
    let mean = mean_f64(returns);
    let std = std_dev(returns);

    if std < 1e-15 {
        return 0.0;
    }

    let m4 = returns
        .iter()
        .map(|r| ((r - mean) / std).powi(4))
        .sum::<f64>()
        / n;
    m4 - 3.0
}

// ─── Tests ───────────────────────────────────────────────────────────
