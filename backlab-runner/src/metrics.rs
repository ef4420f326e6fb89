//! Risk and performance metrics — pure functions over returns and trades.
//!
//! Every metric is a pure function: per-bar returns and/or a trade list in,
//! scalar out. A ratio whose denominator is zero resolves to 0.0, never NaN
//! or infinity.

use serde::{Deserialize, Serialize};

use backlab_core::domain::Trade;
use backlab_core::engine::EquityCurve;

use crate::relative::{relative_metrics, BenchmarkSeries, RelativeMetrics};
use crate::tail_metrics::{compute_tail_metrics, TailMetrics};

/// Bars per year used for annualization.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Complete metric set for one run. Immutable once computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    // ── Returns ──
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,

    // ── Risk-adjusted ──
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub omega: f64,

    // ── Drawdown and tail ──
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub tail_ratio: f64,

    // ── Relative to benchmark ──
    pub beta: f64,
    pub alpha: f64,
    pub tracking_error: f64,
    pub information_ratio: f64,
    pub treynor: f64,
    pub upside_capture: f64,
    pub downside_capture: f64,

    // ── Trades ──
    pub total_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub recovery_factor: f64,
    pub avg_trade_profit: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl RiskMetrics {
    /// Compute every metric from a finished run.
    ///
    /// `risk_free_rate` is annual. Relative metrics stay 0 without a benchmark
    /// or with fewer than two overlapping timestamps.
    pub fn compute(
        curve: &EquityCurve,
        trades: &[Trade],
        benchmark: Option<&BenchmarkSeries>,
        risk_free_rate: f64,
    ) -> Self {
        let equity = curve.equity();
        let returns = curve.returns();

        let annualized = annualized_return(&returns);
        let mdd = max_drawdown(&returns);
        let total = total_return(&equity);
        let TailMetrics {
            var_95,
            var_99,
            cvar_95,
            cvar_99,
            skewness,
            kurtosis,
            tail_ratio,
        } = compute_tail_metrics(&returns);

        let relative = match benchmark {
            Some(bench) => {
                let series: Vec<_> = curve
                    .timestamps()
                    .into_iter()
                    .zip(returns.iter().copied())
                    .collect();
                relative_metrics(&series, bench, risk_free_rate)
            }
            None => RelativeMetrics::default(),
        };

        Self {
            total_return: total,
            annualized_return: annualized,
            volatility: volatility(&returns),
            sharpe: sharpe_ratio(&returns, risk_free_rate),
            sortino: sortino_ratio(&returns, risk_free_rate),
            calmar: calmar_ratio(annualized, mdd),
            omega: omega_ratio(&returns, 0.0),
            max_drawdown: mdd,
            max_drawdown_duration: max_drawdown_duration(&returns),
            var_95,
            var_99,
            cvar_95,
            cvar_99,
            skewness,
            kurtosis,
            tail_ratio,
            beta: relative.beta,
            alpha: relative.alpha,
            tracking_error: relative.tracking_error,
            information_ratio: relative.information_ratio,
            treynor: relative.treynor,
            upside_capture: relative.upside_capture,
            downside_capture: relative.downside_capture,
            total_trades: trades.len(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            recovery_factor: recovery_factor(total, mdd),
            avg_trade_profit: avg_trade_profit(trades),
            max_consecutive_wins: max_consecutive_wins(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
        }
    }

    /// Largest relative difference across the float fields, or `None` when
    /// any count field differs.
    pub fn max_relative_diff(&self, other: &Self) -> Option<f64> {
        if self.max_drawdown_duration != other.max_drawdown_duration
            || self.total_trades != other.total_trades
            || self.max_consecutive_wins != other.max_consecutive_wins
            || self.max_consecutive_losses != other.max_consecutive_losses
        {
            return None;
        }
        let pairs = self
            .float_fields()
            .into_iter()
            .zip(other.float_fields())
            .map(|((_, a), (_, b))| {
                let scale = a.abs().max(b.abs());
                if scale == 0.0 {
                    0.0
                } else {
                    (a - b).abs() / scale
                }
            });
        Some(pairs.fold(0.0, f64::max))
    }

    /// Named float fields in declaration order.
    pub fn float_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total_return", self.total_return),
            ("annualized_return", self.annualized_return),
            ("volatility", self.volatility),
            ("sharpe", self.sharpe),
            ("sortino", self.sortino),
            ("calmar", self.calmar),
            ("omega", self.omega),
            ("max_drawdown", self.max_drawdown),
            ("var_95", self.var_95),
            ("var_99", self.var_99),
            ("cvar_95", self.cvar_95),
            ("cvar_99", self.cvar_99),
            ("skewness", self.skewness),
            ("kurtosis", self.kurtosis),
            ("tail_ratio", self.tail_ratio),
            ("beta", self.beta),
            ("alpha", self.alpha),
            ("tracking_error", self.tracking_error),
            ("information_ratio", self.information_ratio),
            ("treynor", self.treynor),
            ("upside_capture", self.upside_capture),
            ("downside_capture", self.downside_capture),
            ("win_rate", self.win_rate),
            ("profit_factor", self.profit_factor),
            ("recovery_factor", self.recovery_factor),
            ("avg_trade_profit", self.avg_trade_profit),
        ]
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: final / initial − 1.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if equity.len() >= 2 && first > 0.0 => ratio(last, first) - 1.0,
        _ => 0.0,
    }
}

/// `(1 + mean(returns))^252 − 1`.
pub fn annualized_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    finite_or_zero((1.0 + mean_f64(returns)).powf(PERIODS_PER_YEAR) - 1.0)
}

/// Sample standard deviation of returns, annualized.
pub fn volatility(returns: &[f64]) -> f64 {
    std_dev(returns) * PERIODS_PER_YEAR.sqrt()
}

/// `(annualized_return − rf) / volatility`.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    ratio(annualized_return(returns) - risk_free_rate, volatility(returns))
}

/// Annualized standard deviation of the negative returns only.
pub fn downside_deviation(returns: &[f64]) -> f64 {
    let negative: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
    std_dev(&negative) * PERIODS_PER_YEAR.sqrt()
}

/// Sharpe with downside deviation in place of volatility.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    ratio(
        annualized_return(returns) - risk_free_rate,
        downside_deviation(returns),
    )
}

/// Drawdown series from the compounded return path: `wealth / peak − 1`.
pub fn drawdown_series(returns: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0_f64;
    let mut peak = f64::MIN;
    returns
        .iter()
        .map(|r| {
            wealth *= 1.0 + r;
            peak = peak.max(wealth);
            if peak > 0.0 {
                wealth / peak - 1.0
            } else {
                -1.0
            }
        })
        .collect()
}

/// Maximum drawdown as a positive fraction in [0, 1].
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let worst = drawdown_series(returns).into_iter().fold(0.0_f64, f64::min);
    (-worst).clamp(0.0, 1.0)
}

/// Longest run of consecutive bars spent below a prior peak.
pub fn max_drawdown_duration(returns: &[f64]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for dd in drawdown_series(returns) {
        if dd < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// `annualized_return / max_drawdown`.
pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> f64 {
    ratio(annualized_return, max_drawdown)
}

/// Gains above `threshold` over the magnitude of losses below it.
pub fn omega_ratio(returns: &[f64], threshold: f64) -> f64 {
    let gains: f64 = returns.iter().map(|r| (r - threshold).max(0.0)).sum();
    let losses: f64 = returns.iter().map(|r| (r - threshold).min(0.0)).sum();
    ratio(gains, losses.abs())
}

/// Fraction of trades with positive profit.
pub fn win_rate(trades: &[Trade]) -> f64 {
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    ratio(winners as f64, trades.len() as f64)
}

/// Gross profit over gross loss.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.profit > 0.0)
        .map(|t| t.profit)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.profit < 0.0)
        .map(|t| t.profit.abs())
        .sum();
    ratio(gross_profit, gross_loss)
}

/// `total_return / max_drawdown`.
pub fn recovery_factor(total_return: f64, max_drawdown: f64) -> f64 {
    ratio(total_return, max_drawdown)
}

pub fn avg_trade_profit(trades: &[Trade]) -> f64 {
    mean_f64(&trades.iter().map(|t| t.profit).collect::<Vec<_>>())
}

/// Maximum consecutive winning trades.
pub fn max_consecutive_wins(trades: &[Trade]) -> usize {
    max_consecutive(trades, true)
}

/// Maximum consecutive losing trades.
pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    max_consecutive(trades, false)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// `num / den`, or 0.0 when the denominator is zero or the result is not finite.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        return 0.0;
    }
    finite_or_zero(num / den)
}

pub(crate) fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample (n − 1) standard deviation; 0.0 below two observations.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(trades: &[Trade], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;

    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            if current > max_streak {
                max_streak = current;
            }
        } else {
            current = 0;
        }
    }
    max_streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlab_core::domain::{ExitReason, PositionSide};
    use chrono::NaiveDate;

    fn make_trade(profit: f64) -> Trade {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Trade {
            side: PositionSide::Long,
            entry_timestamp: ts,
            entry_price: 100.0,
            exit_timestamp: ts + chrono::Duration::days(5),
            exit_price: 100.0 + profit / 50.0,
            shares: 50,
            entry_commission: 0.0,
            exit_commission: 0.0,
            profit,
            holding_periods: 5,
            exit_reason: ExitReason::Signal,
        }
    }

    #[test]
    fn total_return_from_equity() {
        assert!((total_return(&[100.0, 110.0, 120.0]) - 0.2).abs() < 1e-12);
        assert_eq!(total_return(&[100.0]), 0.0);
        assert_eq!(total_return(&[0.0, 10.0]), 0.0);
    }

    #[test]
    fn annualized_and_volatility_match_formulas() {
        let r = [0.01, -0.005, 0.002, 0.0];
        let mean: f64 = 0.007 / 4.0;
        assert!((annualized_return(&r) - ((1.0 + mean).powf(252.0) - 1.0)).abs() < 1e-12);
        let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 3.0;
        assert!((volatility(&r) - var.sqrt() * 252.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn zero_volatility_ratios_are_zero() {
        let flat = [0.0; 30];
        assert_eq!(sharpe_ratio(&flat, 0.02), 0.0);
        assert_eq!(sortino_ratio(&flat, 0.0), 0.0);
        assert_eq!(omega_ratio(&flat, 0.0), 0.0);
        assert_eq!(calmar_ratio(0.5, 0.0), 0.0);
        assert_eq!(recovery_factor(0.5, 0.0), 0.0);
    }

    #[test]
    fn sortino_ignores_upside() {
        let r = [0.02, -0.01, 0.03, -0.02, 0.01];
        let neg = [-0.01, -0.02];
        let dd = std_dev(&neg) * 252.0_f64.sqrt();
        assert!((sortino_ratio(&r, 0.0) - annualized_return(&r) / dd).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_positive_fraction() {
        // 100 → 110 → 88 → 99: peak 110, trough 88 → 20%.
        let r = [0.0, 0.1, -0.2, 0.125];
        assert!((max_drawdown(&r) - 0.2).abs() < 1e-12);
        assert_eq!(max_drawdown_duration(&r), 2);
    }

    #[test]
    fn max_drawdown_of_rising_series_is_zero() {
        assert_eq!(max_drawdown(&[0.01, 0.02, 0.0, 0.03]), 0.0);
        assert_eq!(max_drawdown_duration(&[0.01, 0.02]), 0);
    }

    #[test]
    fn drawdown_is_bounded_by_one() {
        assert_eq!(max_drawdown(&[0.0, -1.5, 0.1]), 1.0);
    }

    #[test]
    fn omega_ratio_value() {
        let r = [0.02, -0.01, 0.03, -0.02];
        assert!((omega_ratio(&r, 0.0) - 0.05 / 0.03).abs() < 1e-12);
    }

    #[test]
    fn win_rate_and_profit_factor() {
        let trades = vec![
            make_trade(100.0),
            make_trade(-50.0),
            make_trade(200.0),
            make_trade(-50.0),
        ];
        assert!((win_rate(&trades) - 0.5).abs() < 1e-12);
        assert!((profit_factor(&trades) - 3.0).abs() < 1e-12);
        assert!((avg_trade_profit(&trades) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_without_losses_is_zero() {
        let trades = vec![make_trade(100.0), make_trade(20.0)];
        assert_eq!(profit_factor(&trades), 0.0);
        assert_eq!(win_rate(&[]), 0.0);
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn consecutive_streaks() {
        let trades: Vec<Trade> = [1.0, 1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0]
            .iter()
            .map(|&p| make_trade(p))
            .collect();
        assert_eq!(max_consecutive_wins(&trades), 4);
        assert_eq!(max_consecutive_losses(&trades), 3);
    }

    #[test]
    fn ratio_guards_non_finite() {
        assert_eq!(ratio(1.0, 0.0), 0.0);
        assert_eq!(ratio(f64::INFINITY, 1.0), 0.0);
        assert_eq!(ratio(1.0, f64::NAN), 0.0);
        assert_eq!(ratio(3.0, 2.0), 1.5);
    }

    #[test]
    fn max_relative_diff_detects_changes() {
        let a = RiskMetrics {
            sharpe: 1.0,
            total_trades: 3,
            ..RiskMetrics::default()
        };
        let b = RiskMetrics {
            sharpe: 1.0 + 1e-12,
            ..a.clone()
        };
        assert!(a.max_relative_diff(&b).unwrap() < 1e-9);
        let c = RiskMetrics {
            total_trades: 4,
            ..a.clone()
        };
        assert!(a.max_relative_diff(&c).is_none());
    }
}
