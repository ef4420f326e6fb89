//! Parameter range checks.

use backlab_core::engine::SimulationParams;

use super::{score_from_counts, Findings, ValidationResult};

/// Round-trip cost above which a warning is raised.
pub const MAX_ROUND_TRIP_COST: f64 = 0.02;

/// Inclusive `(name, min, max)` bounds for every numeric parameter.
pub const PARAMETER_BOUNDS: [(&str, f64, f64); 9] = [
    ("initial_capital", 1e2, 1e10),
    ("position_size", 0.01, 1.0),
    ("commission_pct", 0.0, 0.05),
    ("slippage_pct", 0.0, 0.05),
    ("min_commission", 0.0, 1_000.0),
    ("stop_loss_pct", 0.001, 0.5),
    ("take_profit_pct", 0.001, 1.0),
    ("max_holding_periods", 1.0, 10_000.0),
    ("risk_free_rate", -0.05, 0.2),
];

/// Present values by name. Unset optional parameters are skipped.
fn values(params: &SimulationParams) -> Vec<(&'static str, f64)> {
    let mut out = vec![
        ("initial_capital", params.initial_capital),
        ("position_size", params.position_size),
        ("commission_pct", params.commission_pct),
        ("slippage_pct", params.slippage_pct),
        ("min_commission", params.min_commission),
        ("risk_free_rate", params.risk_free_rate),
    ];
    if let Some(v) = params.stop_loss_pct {
        out.push(("stop_loss_pct", v));
    }
    if let Some(v) = params.take_profit_pct {
        out.push(("take_profit_pct", v));
    }
    if let Some(v) = params.max_holding_periods {
        out.push(("max_holding_periods", f64::from(v)));
    }
    out
}

fn bounds(name: &str) -> Option<(f64, f64)> {
    PARAMETER_BOUNDS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, lo, hi)| (lo, hi))
}

pub fn validate_parameters(params: &SimulationParams) -> ValidationResult {
    let mut f = Findings::default();

    for (name, value) in values(params) {
        if !value.is_finite() {
            f.errors.push(format!("{name} is not a finite number"));
            continue;
        }
        let Some((lo, hi)) = bounds(name) else {
            continue;
        };
        if value < lo || value > hi {
            f.errors
                .push(format!("{name} = {value} outside allowed range [{lo}, {hi}]"));
        }
    }

    if let (Some(stop), Some(take)) = (params.stop_loss_pct, params.take_profit_pct) {
        if stop >= take {
            f.warnings.push(format!(
                "stop_loss_pct ({stop}) is not below take_profit_pct ({take})"
            ));
            f.suggestions
                .push("a stop at or beyond the profit target inverts the reward/risk".into());
        }
    }

    let round_trip = params.cost_model().round_trip_pct();
    if round_trip > MAX_ROUND_TRIP_COST {
        f.warnings.push(format!(
            "round-trip cost {:.2}% exceeds {:.0}%",
            round_trip * 100.0,
            MAX_ROUND_TRIP_COST * 100.0
        ));
        f.suggestions
            .push("lower commission or slippage; high costs dominate short holding periods".into());
    }

    let score = score_from_counts(f.errors.len(), f.warnings.len());
    ValidationResult::from_score(score, f)
}
