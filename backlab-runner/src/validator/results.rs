//! Sanity checks on a finished run.

use backlab_core::domain::Trade;
use backlab_core::engine::EquityCurve;

use super::{score_from_counts, Findings, ValidationResult};
use crate::metrics::{max_drawdown, volatility};

/// Fewer closed trades than this makes the statistics unreliable.
pub const MIN_TRADES: usize = 10;
pub const MAX_DRAWDOWN: f64 = 0.5;
pub const MAX_VOLATILITY: f64 = 1.0;

pub fn validate_results(curve: &EquityCurve, trades: &[Trade]) -> ValidationResult {
    let mut f = Findings::default();

    if curve.is_empty() {
        f.errors.push("equity curve is empty".into());
        let score = score_from_counts(f.errors.len(), 0);
        return ValidationResult::from_score(score, f);
    }

    if trades.len() < MIN_TRADES {
        f.warnings.push(format!(
            "only {} closed trades; at least {MIN_TRADES} needed for meaningful statistics",
            trades.len()
        ));
        f.suggestions
            .push("extend the history or loosen the signal to produce more trades".into());
    }

    let returns = curve.returns();
    let mdd = max_drawdown(&returns);
    if mdd > MAX_DRAWDOWN {
        f.warnings
            .push(format!("max drawdown {:.1}% exceeds 50%", mdd * 100.0));
        f.suggestions
            .push("reduce position_size or add a stop loss".into());
    }

    let vol = volatility(&returns);
    if vol > MAX_VOLATILITY {
        f.warnings
            .push(format!("annualized volatility {:.1}% exceeds 100%", vol * 100.0));
    }

    let score = score_from_counts(f.errors.len(), f.warnings.len());
    ValidationResult::from_score(score, f)
}
