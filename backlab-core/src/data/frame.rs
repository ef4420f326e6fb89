//! Bar table adapter — polars `DataFrame` ⇄ `Vec<Bar>`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

use crate::domain::{normalize_signal, Bar};
use crate::error::DataError;

/// Columns every bar table must carry, besides the signal column.
pub const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

pub const DEFAULT_SIGNAL_COLUMN: &str = "signal";

const MS_PER_DAY: i64 = 86_400_000;

fn read_err(e: PolarsError) -> DataError {
    DataError::Read(e.to_string())
}

/// True for dtypes that cast losslessly enough to `f64` for prices.
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
    )
}

/// Read `name` as `f64` values, nulls preserved.
pub fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let col = df
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))?;
    if !is_numeric_dtype(col.dtype()) {
        return Err(DataError::InvalidColumnType {
            column: name.to_string(),
            dtype: col.dtype().to_string(),
        });
    }
    let cast = col.cast(&DataType::Float64).map_err(read_err)?;
    let ca = cast.f64().map_err(read_err)?;
    Ok(ca.into_iter().collect())
}

/// Read a timestamp column as epoch milliseconds, nulls preserved.
///
/// Accepts `Datetime` (any unit), `Date`, and integer epoch-millisecond columns.
pub fn timestamps_millis(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, DataError> {
    let col = df
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))?;

    let (physical, scale_num, scale_den) = match col.dtype() {
        DataType::Datetime(unit, _) => {
            let den = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            (col.cast(&DataType::Int64).map_err(read_err)?, 1, den)
        }
        DataType::Date => (col.cast(&DataType::Int64).map_err(read_err)?, MS_PER_DAY, 1),
        DataType::Int64 | DataType::Int32 | DataType::UInt64 | DataType::UInt32 => {
            (col.cast(&DataType::Int64).map_err(read_err)?, 1, 1)
        }
        other => {
            return Err(DataError::InvalidColumnType {
                column: name.to_string(),
                dtype: other.to_string(),
            })
        }
    };

    let ca = physical.i64().map_err(read_err)?;
    Ok(ca
        .into_iter()
        .map(|v| v.map(|x| x * scale_num / scale_den))
        .collect())
}

fn millis_to_datetime(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Convert a bar table into bars.
///
/// Null or NaN prices become `NaN` (the engine drops those rows); a null or
/// NaN signal becomes 0. A null timestamp is an error.
pub fn bars_from_frame(df: &DataFrame, signal_column: &str) -> Result<Vec<Bar>, DataError> {
    for name in REQUIRED_COLUMNS.iter().copied().chain([signal_column]) {
        if df.column(name).is_err() {
            return Err(DataError::MissingColumn(name.to_string()));
        }
    }

    let timestamps = timestamps_millis(df, "timestamp")?;
    let open = float_column(df, "open")?;
    let high = float_column(df, "high")?;
    let low = float_column(df, "low")?;
    let close = float_column(df, "close")?;
    let volume = float_column(df, "volume")?;
    let signal = float_column(df, signal_column)?;

    let price = |v: Option<f64>| v.unwrap_or(f64::NAN);

    timestamps
        .into_iter()
        .enumerate()
        .map(|(i, ts)| {
            let timestamp = ts
                .and_then(millis_to_datetime)
                .ok_or(DataError::NullTimestamp(i))?;
            Ok(Bar {
                timestamp,
                open: price(open[i]),
                high: price(high[i]),
                low: price(low[i]),
                close: price(close[i]),
                volume: volume[i].unwrap_or(0.0),
                signal: signal[i].map_or(0, normalize_signal),
            })
        })
        .collect()
}

/// Build a bar table from bars (signal in column `signal`).
pub fn bars_to_frame(bars: &[Bar]) -> PolarsResult<DataFrame> {
    let millis: Vec<i64> = bars
        .iter()
        .map(|b| b.timestamp.and_utc().timestamp_millis())
        .collect();
    let column = |name: &str, f: fn(&Bar) -> f64| {
        Column::new(name.into(), bars.iter().map(f).collect::<Vec<f64>>())
    };

    DataFrame::new(vec![
        Column::new("timestamp".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        column("open", |b| b.open),
        column("high", |b| b.high),
        column("low", |b| b.low),
        column("close", |b| b.close),
        column("volume", |b| b.volume),
        column(DEFAULT_SIGNAL_COLUMN, |b| b.signal as f64),
    ])
}

/// Load a bar table from a `.csv` or `.parquet` file.
pub fn read_bar_frame(path: &Path) -> Result<DataFrame, DataError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            .map_parse_options(|o| o.with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .map_err(read_err)?
            .finish()
            .map_err(read_err),
        "parquet" | "pq" => {
            let file = fs::File::open(path)
                .map_err(|e| DataError::Read(format!("{}: {e}", path.display())))?;
            ParquetReader::new(file).finish().map_err(read_err)
        }
        other => Err(DataError::Read(format!(
            "unsupported file extension '{other}' for {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_frame() -> DataFrame {
        df!(
            "timestamp" => [1_704_067_200_000_i64, 1_704_153_600_000, 1_704_240_000_000],
            "open" => [100.0, 101.0, 102.0],
            "high" => [101.0, 102.0, 103.0],
            "low" => [99.0, 100.0, 101.0],
            "close" => [100.5, 101.5, 102.5],
            "volume" => [1_000_i64, 1_100, 1_200],
            "signal" => [Some(1.0), None, Some(-3.0)],
        )
        .unwrap()
    }

    #[test]
    fn integer_millis_timestamps_and_signals() {
        let bars = bars_from_frame(&sample_frame(), "signal").unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(
            bars[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(bars[1].volume, 1_100.0);
        assert_eq!(
            bars.iter().map(|b| b.signal).collect::<Vec<_>>(),
            vec![1, 0, -1]
        );
    }

    #[test]
    fn missing_signal_column_is_reported() {
        let err = bars_from_frame(&sample_frame(), "entry").unwrap_err();
        assert_eq!(err, DataError::MissingColumn("entry".into()));
    }

    #[test]
    fn string_price_column_is_rejected() {
        let mut df = sample_frame();
        df.with_column(Column::new("close".into(), ["a", "b", "c"]))
            .unwrap();
        let err = bars_from_frame(&df, "signal").unwrap_err();
        assert!(matches!(err, DataError::InvalidColumnType { ref column, .. } if column == "close"));
    }

    #[test]
    fn frame_round_trip_preserves_bars() {
        let bars = bars_from_frame(&sample_frame(), "signal").unwrap();
        let df = bars_to_frame(&bars).unwrap();
        assert!(matches!(
            df.column("timestamp").unwrap().dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, _)
        ));
        assert_eq!(bars_from_frame(&df, "signal").unwrap(), bars);
    }

    #[test]
    fn csv_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        std::fs::write(
            &path,
            "timestamp,open,high,low,close,volume,signal\n\
             2024-01-01,100,101,99,100.5,1000,1\n\
             2024-01-02,101,102,100,101.5,1100,0\n",
        )
        .unwrap();
        let df = read_bar_frame(&path).unwrap();
        let bars = bars_from_frame(&df, "signal").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 101.5);
        assert_eq!(
            bars[1].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_bar_frame(Path::new("bars.xlsx")).unwrap_err();
        assert!(matches!(err, DataError::Read(_)));
    }
}
