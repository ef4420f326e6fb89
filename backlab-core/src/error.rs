//! Fatal input errors. A `DataError` aborts a run before any equity curve exists.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("column '{column}' has unsupported type {dtype}")]
    InvalidColumnType { column: String, dtype: String },

    #[error("need at least {required} rows, got {actual}")]
    InsufficientRows { required: usize, actual: usize },

    #[error("timestamps must be strictly increasing (row {row})")]
    NonMonotonicIndex { row: usize },

    #[error("null timestamp at row {0}")]
    NullTimestamp(usize),

    #[error("failed to read bar table: {0}")]
    Read(String),
}
