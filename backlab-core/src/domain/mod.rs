//! Domain types for backlab

pub mod bar;
pub mod trade;

pub use bar::{normalize_signal, Bar};
pub use trade::{ExitReason, PositionSide, Trade};
