//! Equity curve — one row per processed bar, exportable as a polars table.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::ExitReason;

/// Per-bar accounting row.
///
/// Invariant: `equity == capital + position value at close`; for long or flat
/// rows that is `capital + shares · close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityRow {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub signal: i8,
    /// Position after the bar: -1, 0 or 1.
    pub position: i8,
    /// Set on bars where a position was opened.
    pub entry_price: Option<f64>,
    pub entry_timestamp: Option<NaiveDateTime>,
    /// Set on bars where a position was closed.
    pub exit_price: Option<f64>,
    pub exit_timestamp: Option<NaiveDateTime>,
    pub holding_periods: u32,
    pub exit_reason: Option<ExitReason>,
    /// Cash after the bar.
    pub capital: f64,
    pub equity: f64,
    pub returns: f64,
    /// Realized profit of a trade closed on this bar, else 0.
    pub trade_profit: f64,
    /// Commission paid on this bar.
    pub commission: f64,
    pub shares: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    rows: Vec<EquityRow>,
}

impl EquityCurve {
    pub fn new(rows: Vec<EquityRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[EquityRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn equity(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.equity).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.returns).collect()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn final_capital(&self) -> Option<f64> {
        self.rows.last().map(|r| r.capital)
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.rows.last().map(|r| r.equity)
    }

    /// Export as a polars table indexed by `timestamp` (epoch milliseconds, UTC).
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let millis = |ts: &NaiveDateTime| ts.and_utc().timestamp_millis();
        let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);

        let timestamp = Series::new(
            "timestamp".into(),
            self.rows.iter().map(|r| millis(&r.timestamp)).collect::<Vec<i64>>(),
        )
        .cast(&datetime)?;
        let entry_timestamp = Series::new(
            "entry_timestamp".into(),
            self.rows
                .iter()
                .map(|r| r.entry_timestamp.as_ref().map(millis))
                .collect::<Vec<Option<i64>>>(),
        )
        .cast(&datetime)?;
        let exit_timestamp = Series::new(
            "exit_timestamp".into(),
            self.rows
                .iter()
                .map(|r| r.exit_timestamp.as_ref().map(millis))
                .collect::<Vec<Option<i64>>>(),
        )
        .cast(&datetime)?;

        let f64_col = |name: &str, f: fn(&EquityRow) -> f64| {
            Series::new(name.into(), self.rows.iter().map(f).collect::<Vec<f64>>())
        };
        let opt_col = |name: &str, f: fn(&EquityRow) -> Option<f64>| {
            Series::new(
                name.into(),
                self.rows.iter().map(f).collect::<Vec<Option<f64>>>(),
            )
        };

        let columns: Vec<Column> = vec![
            timestamp.into(),
            f64_col("close", |r| r.close).into(),
            Series::new(
                "signal".into(),
                self.rows.iter().map(|r| r.signal as i32).collect::<Vec<i32>>(),
            )
            .into(),
            Series::new(
                "position".into(),
                self.rows.iter().map(|r| r.position as i32).collect::<Vec<i32>>(),
            )
            .into(),
            opt_col("entry_price", |r| r.entry_price).into(),
            entry_timestamp.into(),
            opt_col("exit_price", |r| r.exit_price).into(),
            exit_timestamp.into(),
            Series::new(
                "holding_periods".into(),
                self.rows.iter().map(|r| r.holding_periods).collect::<Vec<u32>>(),
            )
            .into(),
            Series::new(
                "exit_reason".into(),
                self.rows
                    .iter()
                    .map(|r| r.exit_reason.map(ExitReason::as_str))
                    .collect::<Vec<Option<&str>>>(),
            )
            .into(),
            f64_col("capital", |r| r.capital).into(),
            f64_col("equity", |r| r.equity).into(),
            f64_col("returns", |r| r.returns).into(),
            f64_col("trade_profit", |r| r.trade_profit).into(),
            f64_col("commission", |r| r.commission).into(),
            Series::new(
                "shares".into(),
                self.rows.iter().map(|r| r.shares).collect::<Vec<u64>>(),
            )
            .into(),
        ];

        DataFrame::new(columns)
    }
}
