//! State module for tracking run progress
//!
//! # Components
//!
//! - `RunPhase`: The phase a run is in (idle, running, interrupted, completed, etc.)
//! - `RunState`: The coordinator's accumulated records and counters

mod run_phase;
mod run_state;

// Re-export main types
pub use run_phase::RunPhase;
pub use run_state::{RunCounts, RunState};
