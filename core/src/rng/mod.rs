//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm for fast, deterministic random number
//! generation. All randomness in the simulator (mock collaborator metric
//! trajectories in particular) goes through this module so that a scenario
//! seed reproduces an identical run.

mod xorshift;

pub use xorshift::RngManager;
