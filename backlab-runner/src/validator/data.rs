//! Bar table checks.
//!
//! Five sections, each scored from 100 and averaged unweighted:
//! 1. Structure: required columns, row count, dtypes
//! 2. Data quality: missing values, non-positive prices, price swings
//! 3. Signal validity: allowed values, activity, churn
//! 4. Timeseries: ordering, duplicates, gap outliers
//! 5. OHLC/volume sanity

use polars::prelude::{DataFrame, DataType};

use backlab_core::data::{float_column, is_numeric_dtype, timestamps_millis, REQUIRED_COLUMNS};

use super::{Findings, Section, ValidationResult};
use crate::tail_metrics::percentile;

/// Fewer rows than this is a warning (one trading year).
pub const MIN_ROWS: usize = 252;
pub const MAX_MISSING_RATIO: f64 = 0.05;
pub const MAX_PRICE_SWING: f64 = 0.5;
pub const MIN_SIGNAL_FREQUENCY: f64 = 0.01;
pub const MAX_SIGNAL_FREQUENCY: f64 = 0.5;
pub const MAX_SIGNAL_CHANGE_FREQUENCY: f64 = 0.8;
pub const GAP_OUTLIER_FACTOR: f64 = 3.0;
pub const VOLUME_SPIKE_FACTOR: f64 = 10.0;
pub const VOLUME_WINDOW: usize = 20;

const PRICE_COLUMNS: [&str; 4] = ["open", "high", "low", "close"];

/// Numeric columns read once and shared by the sections. A column that is
/// missing or non-numeric is `None`.
struct Columns {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

impl Columns {
    fn read(df: &DataFrame) -> Self {
        let get = |name| float_column(df, name).ok();
        Self {
            open: get("open"),
            high: get("high"),
            low: get("low"),
            close: get("close"),
            volume: get("volume"),
        }
    }

    fn prices(&self) -> [(&'static str, Option<&Vec<Option<f64>>>); 4] {
        [
            ("open", self.open.as_ref()),
            ("high", self.high.as_ref()),
            ("low", self.low.as_ref()),
            ("close", self.close.as_ref()),
        ]
    }
}

/// Score a bar table. `signal_column` names the strategy signal column.
pub fn validate_data(df: &DataFrame, signal_column: &str) -> ValidationResult {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| df.column(c).is_err())
        .collect();
    if !missing.is_empty() {
        let mut section = Section::default();
        section.fail(format!("missing required columns: {}", missing.join(", ")));
        section.suggest("provide timestamp, open, high, low, close and volume columns");
        return ValidationResult::from_score(0.0, section.findings);
    }

    let cols = Columns::read(df);
    let sections = [
        check_structure(df),
        check_quality(&cols),
        check_signals(df, signal_column),
        check_timeseries(df),
        check_ohlc(&cols),
    ];

    let score = sections.iter().map(|s| s.score).sum::<f64>() / sections.len() as f64;
    let mut findings = Findings::default();
    for section in sections {
        findings.extend(section.findings);
    }
    ValidationResult::from_score(score, findings)
}

// ── 1. Structure ─────────────────────────────────────────────────────

fn check_structure(df: &DataFrame) -> Section {
    let mut s = Section::default();

    if df.height() < MIN_ROWS {
        s.warning(
            20.0,
            format!("only {} rows; at least {MIN_ROWS} recommended", df.height()),
        );
        s.suggest("use at least one year of daily bars for stable statistics");
    }

    for name in PRICE_COLUMNS.iter().chain(["volume"].iter()) {
        if let Ok(col) = df.column(name) {
            if !is_numeric_dtype(col.dtype()) {
                s.error(
                    25.0,
                    format!("column '{name}' has non-numeric type {}", col.dtype()),
                );
            }
        }
    }

    if let Ok(col) = df.column("timestamp") {
        let ok = matches!(
            col.dtype(),
            DataType::Datetime(_, _)
                | DataType::Date
                | DataType::Int64
                | DataType::Int32
                | DataType::UInt64
                | DataType::UInt32
        );
        if !ok {
            s.error(
                25.0,
                format!("column 'timestamp' has unsupported type {}", col.dtype()),
            );
            s.suggest("store timestamps as datetime, date, or epoch milliseconds");
        }
    }
    s
}

// ── 2. Data quality ──────────────────────────────────────────────────

fn is_missing(v: &Option<f64>) -> bool {
    v.map_or(true, f64::is_nan)
}

fn check_quality(cols: &Columns) -> Section {
    let mut s = Section::default();

    let present: Vec<&Vec<Option<f64>>> = cols
        .prices()
        .iter()
        .filter_map(|(_, c)| *c)
        .chain(cols.volume.as_ref())
        .collect();
    let cells: usize = present.iter().map(|c| c.len()).sum();
    let missing: usize = present
        .iter()
        .map(|c| c.iter().filter(|v| is_missing(v)).count())
        .sum();
    if cells > 0 && missing > 0 {
        let ratio = missing as f64 / cells as f64;
        if ratio > MAX_MISSING_RATIO {
            s.error(
                30.0,
                format!(
                    "{:.1}% of OHLCV values are missing ({missing} cells)",
                    ratio * 100.0
                ),
            );
            s.suggest("fill or drop rows with missing prices before backtesting");
        } else {
            s.warning(10.0, format!("{missing} missing OHLCV values"));
        }
    }

    let rows = cols
        .prices()
        .iter()
        .filter_map(|(_, c)| c.map(|v| v.len()))
        .max()
        .unwrap_or(0);
    let non_positive = (0..rows)
        .filter(|&i| {
            cols.prices().iter().any(|(_, c)| {
                c.and_then(|v| v.get(i).copied().flatten())
                    .is_some_and(|p| p <= 0.0)
            })
        })
        .count();
    if non_positive > 0 {
        s.error(
            30.0,
            format!("{non_positive} rows with non-positive prices"),
        );
        s.suggest("non-positive prices are dropped by the engine; check the data source");
    }

    if let Some(close) = &cols.close {
        let swings = close
            .windows(2)
            .filter(|w| match (w[0], w[1]) {
                (Some(a), Some(b)) if a > 0.0 && b.is_finite() => {
                    (b / a - 1.0).abs() > MAX_PRICE_SWING
                }
                _ => false,
            })
            .count();
        if swings > 0 {
            s.warning(
                10.0,
                format!(
                    "{swings} single-bar price moves above {:.0}%",
                    MAX_PRICE_SWING * 100.0
                ),
            );
            s.suggest("check for unadjusted splits or bad ticks");
        }
    }
    s
}

// ── 3. Signal validity ───────────────────────────────────────────────

fn check_signals(df: &DataFrame, signal_column: &str) -> Section {
    let mut s = Section::default();

    let values = match float_column(df, signal_column) {
        Ok(v) => v,
        Err(e) => {
            s.fail(format!("signal column '{signal_column}' unusable: {e}"));
            s.suggest("add a signal column with values -1, 0 or 1");
            return s;
        }
    };
    let signals: Vec<f64> = values.into_iter().flatten().filter(|v| !v.is_nan()).collect();

    let invalid = signals
        .iter()
        .filter(|&&v| v != -1.0 && v != 0.0 && v != 1.0)
        .count();
    if invalid > 0 {
        s.error(
            50.0,
            format!("{invalid} signal values outside {{-1, 0, 1}}"),
        );
        s.suggest("map signals onto -1 (short), 0 (flat) and 1 (long)");
    }

    if !signals.is_empty() {
        let active = signals.iter().filter(|&&v| v != 0.0).count() as f64 / signals.len() as f64;
        if !(MIN_SIGNAL_FREQUENCY..=MAX_SIGNAL_FREQUENCY).contains(&active) {
            s.warning(
                20.0,
                format!(
                    "non-zero signal frequency {:.1}% outside [{:.0}%, {:.0}%]",
                    active * 100.0,
                    MIN_SIGNAL_FREQUENCY * 100.0,
                    MAX_SIGNAL_FREQUENCY * 100.0
                ),
            );
        }
    }

    if signals.len() >= 2 {
        let changes = signals.windows(2).filter(|w| w[0] != w[1]).count() as f64
            / (signals.len() - 1) as f64;
        if changes >= MAX_SIGNAL_CHANGE_FREQUENCY {
            s.warning(
                20.0,
                format!("signal changes on {:.1}% of bars", changes * 100.0),
            );
            s.suggest("a signal that flips nearly every bar is dominated by costs");
        }
    }
    s
}

// ── 4. Timeseries ────────────────────────────────────────────────────

fn check_timeseries(df: &DataFrame) -> Section {
    let mut s = Section::default();

    let raw = match timestamps_millis(df, "timestamp") {
        Ok(v) => v,
        Err(e) => {
            s.fail(format!("timestamps unusable: {e}"));
            return s;
        }
    };
    let nulls = raw.iter().filter(|t| t.is_none()).count();
    if nulls > 0 {
        s.error(40.0, format!("{nulls} null timestamps"));
    }
    let ts: Vec<i64> = raw.into_iter().flatten().collect();

    let duplicates = ts.windows(2).filter(|w| w[1] == w[0]).count();
    let decreasing = ts.windows(2).filter(|w| w[1] < w[0]).count();
    if duplicates > 0 {
        s.error(40.0, format!("{duplicates} duplicate timestamps"));
    }
    if decreasing > 0 {
        s.error(
            40.0,
            format!("timestamps not strictly increasing ({decreasing} decreasing steps)"),
        );
        s.suggest("sort the table by timestamp");
    }

    let gaps: Vec<f64> = ts
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&g| g > 0)
        .map(|g| g as f64)
        .collect();
    if gaps.len() >= 2 {
        let median = percentile(&gaps, 50.0);
        let outliers = gaps
            .iter()
            .filter(|&&g| g > GAP_OUTLIER_FACTOR * median)
            .count();
        if outliers > 0 {
            s.warning(
                10.0,
                format!("{outliers} gaps longer than {GAP_OUTLIER_FACTOR}× the median interval"),
            );
            s.suggest("check for missing sessions in the data source");
        }
    }
    s
}

// ── 5. OHLC / volume ─────────────────────────────────────────────────

fn check_ohlc(cols: &Columns) -> Section {
    let mut s = Section::default();

    if let (Some(open), Some(high), Some(low), Some(close)) =
        (&cols.open, &cols.high, &cols.low, &cols.close)
    {
        let mut bad_high = 0;
        let mut bad_low = 0;
        for i in 0..close.len() {
            if let (Some(o), Some(h), Some(l), Some(c)) = (open[i], high[i], low[i], close[i]) {
                if h < o.max(c) {
                    bad_high += 1;
                }
                if l > o.min(c) {
                    bad_low += 1;
                }
            }
        }
        if bad_high > 0 {
            s.error(30.0, format!("{bad_high} bars with high below max(open, close)"));
        }
        if bad_low > 0 {
            s.error(30.0, format!("{bad_low} bars with low above min(open, close)"));
        }
    }

    if let Some(volume) = &cols.volume {
        let negative = volume.iter().flatten().filter(|&&v| v < 0.0).count();
        if negative > 0 {
            s.error(20.0, format!("{negative} bars with negative volume"));
        }

        let spikes = volume_spikes(volume);
        if spikes > 0 {
            s.warning(
                10.0,
                format!(
                    "{spikes} volume spikes above {VOLUME_SPIKE_FACTOR}× the {VOLUME_WINDOW}-bar mean"
                ),
            );
        }
    }
    s
}

/// Bars whose volume exceeds the factor times the mean of the preceding window.
fn volume_spikes(volume: &[Option<f64>]) -> usize {
    let v: Vec<f64> = volume.iter().map(|x| x.unwrap_or(f64::NAN)).collect();
    (VOLUME_WINDOW..v.len())
        .filter(|&i| {
            let window = &v[i - VOLUME_WINDOW..i];
            if window.iter().any(|x| !x.is_finite()) || !v[i].is_finite() {
                return false;
            }
            let mean = window.iter().sum::<f64>() / VOLUME_WINDOW as f64;
            mean > 0.0 && v[i] > VOLUME_SPIKE_FACTOR * mean
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlab_core::data::{bars_to_frame, random_walk};
    use polars::prelude::*;

    fn clean_frame() -> DataFrame {
        bars_to_frame(&random_walk(400, 21)).unwrap()
    }

    fn replace_f64(df: &mut DataFrame, name: &str, f: impl Fn(usize, f64) -> f64) {
        let values: Vec<f64> = float_column(df, name)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, v)| f(i, v.unwrap()))
            .collect();
        df.with_column(Column::new(name.into(), values)).unwrap();
    }

    #[test]
    fn clean_synthetic_table_is_valid() {
        let r = validate_data(&clean_frame(), "signal");
        assert!(r.is_valid, "errors: {:?}", r.errors);
        assert!(r.quality_score > 70.0);
    }

    #[test]
    fn missing_required_column_scores_zero() {
        let df = clean_frame().drop("volume").unwrap();
        let r = validate_data(&df, "signal");
        assert!(!r.is_valid);
        assert_eq!(r.quality_score, 0.0);
        assert!(r.errors[0].contains("volume"));
    }

    #[test]
    fn negative_closes_are_counted() {
        let clean = clean_frame();
        let mut dirty = clean.clone();
        replace_f64(&mut dirty, "close", |i, v| {
            if [10, 50, 90].contains(&i) {
                -v
            } else {
                v
            }
        });

        let good = validate_data(&clean, "signal");
        let bad = validate_data(&dirty, "signal");
        assert!(!bad.is_valid);
        assert!(bad.errors.iter().any(|e| e.contains('3')), "{:?}", bad.errors);
        assert!(bad.quality_score < good.quality_score);
    }

    #[test]
    fn short_table_warns() {
        let df = bars_to_frame(&random_walk(100, 2)).unwrap();
        let r = validate_data(&df, "signal");
        assert!(r.warnings.iter().any(|w| w.contains("100 rows")));
    }

    #[test]
    fn out_of_range_signals_are_errors() {
        let mut df = clean_frame();
        replace_f64(&mut df, "signal", |i, v| if i == 5 { 2.0 } else { v });
        let r = validate_data(&df, "signal");
        assert!(!r.is_valid);
        assert!(r.errors.iter().any(|e| e.contains("outside {-1, 0, 1}")));
    }

    #[test]
    fn missing_signal_column_is_an_error() {
        let r = validate_data(&clean_frame(), "entry_signal");
        assert!(!r.is_valid);
        assert!(r.errors.iter().any(|e| e.contains("entry_signal")));
    }

    #[test]
    fn flipping_signal_warns_on_churn() {
        let mut df = clean_frame();
        replace_f64(&mut df, "signal", |i, _| if i % 2 == 0 { 1.0 } else { -1.0 });
        let r = validate_data(&df, "signal");
        assert!(r.warnings.iter().any(|w| w.contains("signal changes")));
        // Every bar non-zero is also outside the activity band.
        assert!(r.warnings.iter().any(|w| w.contains("non-zero signal frequency")));
    }

    #[test]
    fn duplicate_timestamps_are_errors() {
        let mut df = clean_frame();
        let ts: Vec<i64> = timestamps_millis(&df, "timestamp")
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, t)| if i == 3 { t.unwrap() - 86_400_000 } else { t.unwrap() })
            .collect();
        df.with_column(Column::new("timestamp".into(), ts)).unwrap();
        let r = validate_data(&df, "signal");
        assert!(r.errors.iter().any(|e| e.contains("duplicate")));
    }

    #[test]
    fn gap_outliers_warn() {
        let mut df = clean_frame();
        let ts: Vec<i64> = timestamps_millis(&df, "timestamp")
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.unwrap() + if i >= 200 { 10 * 86_400_000 } else { 0 })
            .collect();
        df.with_column(Column::new("timestamp".into(), ts)).unwrap();
        let r = validate_data(&df, "signal");
        assert!(r.warnings.iter().any(|w| w.contains("gaps")));
    }

    #[test]
    fn high_below_close_is_an_error() {
        let mut df = clean_frame();
        replace_f64(&mut df, "high", |i, v| if i == 7 { v * 0.5 } else { v });
        let r = validate_data(&df, "signal");
        assert!(r.errors.iter().any(|e| e.contains("high below")));
    }

    #[test]
    fn volume_spike_warns_and_negative_volume_errors() {
        let mut df = clean_frame();
        replace_f64(&mut df, "volume", |i, v| match i {
            100 => v * 1_000.0,
            200 => -1.0,
            _ => v,
        });
        let r = validate_data(&df, "signal");
        assert!(r.warnings.iter().any(|w| w.contains("volume spikes")));
        assert!(r.errors.iter().any(|e| e.contains("negative volume")));
    }

    #[test]
    fn missing_values_are_reported() {
        let mut df = clean_frame();
        let close: Vec<Option<f64>> = float_column(&df, "close")
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, v)| if i == 42 { None } else { v })
            .collect();
        df.with_column(Column::new("close".into(), close)).unwrap();
        let r = validate_data(&df, "signal");
        assert!(r.warnings.iter().any(|w| w.contains("missing OHLCV")));
    }
}
