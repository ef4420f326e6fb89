//! Benchmark-relative metrics — beta, alpha, tracking error, capture ratios.
//!
//! Strategy and benchmark returns are joined on timestamp; only overlapping
//! bars contribute. Fewer than two overlapping bars yields all zeros.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use backlab_core::data::{float_column, timestamps_millis};
use backlab_core::domain::Bar;
use backlab_core::DataError;

use crate::metrics::{mean_f64, ratio, std_dev, PERIODS_PER_YEAR};

/// Minimum overlapping observations for relative metrics.
pub const MIN_OVERLAP: usize = 2;

/// Per-bar benchmark returns keyed by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSeries {
    pub points: Vec<(NaiveDateTime, f64)>,
}

impl BenchmarkSeries {
    pub fn new(points: Vec<(NaiveDateTime, f64)>) -> Self {
        Self { points }
    }

    /// Close-to-close returns of a benchmark bar series. The first bar has no
    /// prior close and is skipped, as are bars with non-tradable prices.
    pub fn from_bars(bars: &[Bar]) -> Self {
        let usable: Vec<&Bar> = bars.iter().filter(|b| b.is_tradable()).collect();
        let points = usable
            .windows(2)
            .map(|w| (w[1].timestamp, w[1].close / w[0].close - 1.0))
            .collect();
        Self { points }
    }

    /// Close-to-close returns from a table with `timestamp` and `close`
    /// columns. Rows with a null timestamp or a non-positive close are skipped.
    pub fn from_frame(df: &DataFrame) -> Result<Self, DataError> {
        let timestamps = timestamps_millis(df, "timestamp")?;
        let closes = float_column(df, "close")?;
        let usable: Vec<(NaiveDateTime, f64)> = timestamps
            .into_iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                let ts = DateTime::from_timestamp_millis(ts?)?.naive_utc();
                close.filter(|c| c.is_finite() && *c > 0.0).map(|c| (ts, c))
            })
            .collect();
        let points = usable
            .windows(2)
            .map(|w| (w[1].0, w[1].1 / w[0].1 - 1.0))
            .collect();
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Pairs `(strategy, benchmark)` for timestamps present in both, in
    /// strategy order.
    pub fn align(&self, strategy: &[(NaiveDateTime, f64)]) -> Vec<(f64, f64)> {
        let lookup: HashMap<NaiveDateTime, f64> = self.points.iter().copied().collect();
        strategy
            .iter()
            .filter_map(|(ts, r)| lookup.get(ts).map(|b| (*r, *b)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelativeMetrics {
    pub beta: f64,
    pub alpha: f64,
    pub tracking_error: f64,
    pub information_ratio: f64,
    pub treynor: f64,
    pub upside_capture: f64,
    pub downside_capture: f64,
    /// Number of overlapping bars used.
    pub overlap: usize,
}

/// Compute relative metrics of `strategy` returns against `benchmark`.
/// `risk_free_rate` is annual.
pub fn relative_metrics(
    strategy: &[(NaiveDateTime, f64)],
    benchmark: &BenchmarkSeries,
    risk_free_rate: f64,
) -> RelativeMetrics {
    let pairs = benchmark.align(strategy);
    if pairs.len() < MIN_OVERLAP {
        return RelativeMetrics {
            overlap: pairs.len(),
            ..RelativeMetrics::default()
        };
    }

    let daily_rf = risk_free_rate / PERIODS_PER_YEAR;
    let returns: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let bench: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let excess_bench: Vec<f64> = bench.iter().map(|b| b - daily_rf).collect();
    let active: Vec<f64> = pairs.iter().map(|(r, b)| r - b).collect();

    let beta = ratio(covariance(&excess, &excess_bench), variance(&excess_bench));
    let alpha = (mean_f64(&excess) - beta * mean_f64(&excess_bench)) * PERIODS_PER_YEAR;
    let tracking_error = std_dev(&active) * PERIODS_PER_YEAR.sqrt();
    let information_ratio = ratio(mean_f64(&active), tracking_error) * PERIODS_PER_YEAR.sqrt();
    let treynor = ratio(mean_f64(&returns) * PERIODS_PER_YEAR - risk_free_rate, beta);

    RelativeMetrics {
        beta,
        alpha,
        tracking_error,
        information_ratio,
        treynor,
        upside_capture: capture(&pairs, |b| b > 0.0),
        downside_capture: capture(&pairs, |b| b < 0.0),
        overlap: pairs.len(),
    }
}

/// Mean strategy return over mean benchmark return, restricted to bars whose
/// benchmark return satisfies `regime`.
fn capture(pairs: &[(f64, f64)], regime: impl Fn(f64) -> bool) -> f64 {
    let (strategy, bench): (Vec<f64>, Vec<f64>) =
        pairs.iter().copied().filter(|&(_, b)| regime(b)).unzip();
    ratio(mean_f64(&strategy), mean_f64(&bench))
}

/// Sample covariance (n − 1).
fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let ma = mean_f64(&a[..n]);
    let mb = mean_f64(&b[..n]);
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n - 1) as f64
}

fn variance(values: &[f64]) -> f64 {
    covariance(values, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(i)
    }

    fn series(values: &[f64]) -> Vec<(NaiveDateTime, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (ts(i as i64), v))
            .collect()
    }

    #[test]
    fn frame_without_signal_column_loads() {
        use polars::prelude::*;
        let df = df!(
            "timestamp" => [1_704_067_200_000_i64, 1_704_153_600_000, 1_704_240_000_000, 1_704_326_400_000],
            "close" => [Some(100.0), Some(110.0), None, Some(99.0)],
        )
        .unwrap();
        let bench = BenchmarkSeries::from_frame(&df).unwrap();
        assert_eq!(bench.len(), 2);
        assert!((bench.points[0].1 - 0.1).abs() < 1e-12);
        assert!((bench.points[1].1 + 0.1).abs() < 1e-12);
    }

    #[test]
    fn strategy_equal_to_benchmark_has_unit_beta() {
        let r = [0.01, -0.02, 0.015, 0.005, -0.01];
        let bench = BenchmarkSeries::new(series(&r));
        let m = relative_metrics(&series(&r), &bench, 0.0);
        assert!((m.beta - 1.0).abs() < 1e-12);
        assert!(m.alpha.abs() < 1e-12);
        assert_eq!(m.tracking_error, 0.0);
        assert_eq!(m.information_ratio, 0.0);
        assert!((m.upside_capture - 1.0).abs() < 1e-12);
        assert!((m.downside_capture - 1.0).abs() < 1e-12);
        assert_eq!(m.overlap, 5);
    }

    #[test]
    fn leveraged_strategy_has_double_beta() {
        let b = [0.01, -0.02, 0.015, 0.005, -0.01];
        let r: Vec<f64> = b.iter().map(|x| 2.0 * x).collect();
        let m = relative_metrics(&series(&r), &BenchmarkSeries::new(series(&b)), 0.0);
        assert!((m.beta - 2.0).abs() < 1e-12);
        assert!((m.upside_capture - 2.0).abs() < 1e-12);
        let expected_treynor = mean_f64(&r) * 252.0 / 2.0;
        assert!((m.treynor - expected_treynor).abs() < 1e-12);
    }

    #[test]
    fn insufficient_overlap_yields_zeros() {
        let strategy = series(&[0.01, 0.02, 0.03]);
        let bench = BenchmarkSeries::new(vec![(ts(2), 0.01), (ts(10), 0.02)]);
        let m = relative_metrics(&strategy, &bench, 0.0);
        assert_eq!(m.beta, 0.0);
        assert_eq!(m.overlap, 1);
    }

    #[test]
    fn constant_benchmark_gives_zero_beta_and_treynor() {
        let strategy = series(&[0.01, -0.01, 0.02]);
        let bench = BenchmarkSeries::new(series(&[0.001, 0.001, 0.001]));
        let m = relative_metrics(&strategy, &bench, 0.0);
        assert_eq!(m.beta, 0.0);
        assert_eq!(m.treynor, 0.0);
        assert_eq!(m.downside_capture, 0.0);
    }

    #[test]
    fn alignment_uses_timestamps_not_positions() {
        let strategy = series(&[0.01, 0.02, 0.03, 0.04]);
        let bench = BenchmarkSeries::new(vec![(ts(3), 0.5), (ts(1), 0.2), (ts(99), 9.0)]);
        assert_eq!(bench.align(&strategy), vec![(0.02, 0.2), (0.04, 0.5)]);
    }

    #[test]
    fn from_bars_computes_close_to_close() {
        let bars: Vec<Bar> = [100.0, 110.0, 99.0]
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: ts(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 0.0,
                signal: 0,
            })
            .collect();
        let bench = BenchmarkSeries::from_bars(&bars);
        assert_eq!(bench.len(), 2);
        assert_eq!(bench.points[0].0, ts(1));
        assert!((bench.points[0].1 - 0.1).abs() < 1e-12);
        assert!((bench.points[1].1 + 0.1).abs() < 1e-12);
    }
}
