//! Alert tiers and threshold evaluation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::RealTimeMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Risk,
    Performance,
    Trading,
    System,
}

/// Which side of a boundary is bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    /// Values at or above the boundary alert (drawdown, volatility).
    Above,
    /// Values at or below the boundary alert (Sharpe, win rate, VaR).
    Below,
}

/// Tier boundaries for one metric. A missing tier never fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub direction: ThresholdDirection,
    #[serde(default = "default_category")]
    pub category: AlertCategory,
    #[serde(default)]
    pub warning: Option<f64>,
    #[serde(default)]
    pub critical: Option<f64>,
    #[serde(default)]
    pub emergency: Option<f64>,
}

fn default_category() -> AlertCategory {
    AlertCategory::Risk
}

impl ThresholdConfig {
    pub fn above(category: AlertCategory, warning: f64, critical: f64, emergency: f64) -> Self {
        Self {
            direction: ThresholdDirection::Above,
            category,
            warning: Some(warning),
            critical: Some(critical),
            emergency: Some(emergency),
        }
    }

    pub fn below(category: AlertCategory, warning: f64, critical: f64, emergency: f64) -> Self {
        Self {
            direction: ThresholdDirection::Below,
            ..Self::above(category, warning, critical, emergency)
        }
    }

    /// Most severe tier crossed by `value`, with its boundary.
    ///
    /// Tiers are scanned emergency first, so a value past several boundaries
    /// reports only the worst one.
    pub fn crossed(&self, value: f64) -> Option<(AlertLevel, f64)> {
        if !value.is_finite() {
            return None;
        }
        let tiers = [
            (AlertLevel::Emergency, self.emergency),
            (AlertLevel::Critical, self.critical),
            (AlertLevel::Warning, self.warning),
        ];
        tiers.into_iter().find_map(|(level, boundary)| {
            let boundary = boundary?;
            let hit = match self.direction {
                ThresholdDirection::Above => value >= boundary,
                ThresholdDirection::Below => value <= boundary,
            };
            hit.then_some((level, boundary))
        })
    }
}

/// Per-metric thresholds keyed by [`RealTimeMetrics`] field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertThresholds {
    metrics: BTreeMap<String, ThresholdConfig>,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        use AlertCategory::{Performance, Risk, Trading};

        let mut metrics = BTreeMap::new();
        metrics.insert(
            "max_drawdown".to_string(),
            ThresholdConfig::above(Risk, 0.10, 0.20, 0.30),
        );
        metrics.insert(
            "volatility".to_string(),
            ThresholdConfig::above(Risk, 0.30, 0.50, 0.80),
        );
        metrics.insert(
            "var_95".to_string(),
            ThresholdConfig::below(Risk, -0.03, -0.05, -0.08),
        );
        metrics.insert(
            "sharpe".to_string(),
            ThresholdConfig::below(Performance, 0.5, 0.0, -1.0),
        );
        metrics.insert(
            "win_rate".to_string(),
            ThresholdConfig::below(Trading, 0.40, 0.30, 0.20),
        );
        Self { metrics }
    }
}

impl AlertThresholds {
    pub fn empty() -> Self {
        Self {
            metrics: BTreeMap::new(),
        }
    }

    pub fn get(&self, metric: &str) -> Option<&ThresholdConfig> {
        self.metrics.get(metric)
    }

    /// Add or replace the thresholds for `metric`.
    pub fn set(&mut self, metric: impl Into<String>, config: ThresholdConfig) {
        self.metrics.insert(metric.into(), config);
    }

    /// Overlay `other` onto these thresholds, metric by metric.
    pub fn merge(&mut self, other: AlertThresholds) {
        self.metrics.extend(other.metrics);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ThresholdConfig)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// One raised alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub category: AlertCategory,
    pub message: String,
    pub metric_name: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub recommendation: String,
}

impl AlertMessage {
    /// A system notice with no metric attached.
    pub fn info(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level: AlertLevel::Info,
            category: AlertCategory::System,
            message: message.into(),
            metric_name: String::new(),
            current_value: 0.0,
            threshold_value: 0.0,
            recommendation: String::new(),
        }
    }
}

fn recommendation(metric: &str, level: AlertLevel) -> String {
    let action = match metric {
        "max_drawdown" => "reduce position size or tighten the stop loss",
        "volatility" => "reduce exposure until volatility settles",
        "var_95" => "review tail exposure and consider hedging",
        "sharpe" => "review whether the strategy still has an edge",
        "win_rate" => "review entry signal quality",
        _ => "review the strategy",
    };
    match level {
        AlertLevel::Emergency => format!("halt trading and {action}"),
        _ => action.to_string(),
    }
}

/// Evaluate every configured metric against `metrics`.
///
/// Emits at most one alert per metric, at the most severe tier crossed.
/// Metrics without a current value (unknown names, or trade statistics
/// before the first closed trade) are skipped.
pub fn evaluate_thresholds(
    metrics: &RealTimeMetrics,
    thresholds: &AlertThresholds,
) -> Vec<AlertMessage> {
    thresholds
        .iter()
        .filter_map(|(name, config)| {
            let value = metrics.value(name)?;
            let (level, boundary) = config.crossed(value)?;
            Some(AlertMessage {
                timestamp: metrics.timestamp,
                level,
                category: config.category,
                message: format!("{name} at {value:.4} crossed the {level} threshold {boundary:.4}"),
                metric_name: name.to_string(),
                current_value: value,
                threshold_value: boundary,
                recommendation: recommendation(name, level),
            })
        })
        .collect()
}
