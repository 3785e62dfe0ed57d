//! Orchestrator - round loop, timed events, and results persistence
//!
//! See `engine.rs` for the scheduler and `results.rs` for the document
//! written when a run ends.

pub mod engine;
pub mod results;

// Re-export main types for convenience
pub use engine::{Progress, SimulationOrchestrator, SimulationStatus};
pub use results::{
    compute_scenario_hash, FinalState, ResultsDocument, ResultsError, ScenarioSummary,
};
