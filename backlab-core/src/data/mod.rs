//! Bar table loading and synthetic data

pub mod frame;
pub mod synthetic;

pub use frame::{
    bars_from_frame, bars_to_frame, float_column, is_numeric_dtype, read_bar_frame,
    timestamps_millis, DEFAULT_SIGNAL_COLUMN, REQUIRED_COLUMNS,
};
pub use synthetic::random_walk;
