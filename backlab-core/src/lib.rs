//! Backlab Core — domain types, the simulation engine, and bar data handling.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, trades, position sides, exit reasons)
//! - Pure per-bar state transition and the bar loop
//! - Cost model (directional slippage, commission with minimum)
//! - Bar table adapter over polars `DataFrame` plus synthetic series
//! - Stable content hashing of simulation inputs

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fingerprint;

pub use error::DataError;
