//! Simulation engine — cost model, per-bar state transition, and the bar loop.
//!
//! The loop consumes a normalized bar series (see [`crate::data`]) and threads
//! an immutable [`TradeState`] through [`step`] once per bar:
//!
//! 1. Exits: stop-loss, take-profit, max holding period, opposing signal
//! 2. Entries: open in the signal's direction when flat
//! 3. Mark-to-market at the close and record the equity row

pub mod cost_model;
pub mod equity;
pub mod loop_runner;
pub mod state;
pub mod step;

pub use cost_model::CostModel;
pub use equity::{EquityCurve, EquityRow};
pub use loop_runner::{run_simulation, SimulationResult, MIN_BARS};
pub use state::{OpenPosition, SimulationParams, TradeState};
pub use step::{check_exit, step, PositionEntry, StepContext, StepOutcome};
