//! FL Simulator Core - Rust Engine
//!
//! Rule-based admission control and round-based orchestration for simulated
//! federated-learning runs under time-varying network conditions.
//!
//! # Architecture
//!
//! - **policy**: rule DSL, named policy chains, runtime clamps, engine
//! - **scenario**: static run descriptions (topology, clients, timed events)
//! - **orchestrator**: worker-thread round loop and results persistence
//! - **sim**: NetworkSimulator / FlServer collaborator seams and mocks
//! - **events**: lifecycle callbacks and the fired-event log
//! - **metrics**: per-round and aggregate run metrics
//! - **rng**: deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Control-plane calls fail open: no public policy or orchestration
//!    method panics or returns an error; failures become log records and
//!    permissive results
//! 2. Rule evaluation order is registration order, and the first deny wins
//! 3. Round numbers increase strictly; each timed event fires at most
//!    once, never before its offset
//! 4. All randomness is seeded (same scenario seed, same run)

// Module declarations
pub mod events;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod scenario;
pub mod sim;

// Re-exports for convenience
pub use events::{CallbackRegistry, EventKind, EventLog, EventRecord, SimEvent};
pub use metrics::{FlMetrics, NetworkMetrics, RoundMetrics, SimulationMetrics};
pub use orchestrator::{
    ResultsDocument, SimulationOrchestrator, SimulationStatus,
};
pub use policy::{
    EngineStatus, EvaluationResult, Policy, PolicyEngine, PolicyRegistry, PolicySpec,
    RuntimeRule, RuntimeRuleSet,
};
pub use rng::RngManager;
pub use scenario::{
    ClientConfig, LinkConfig, Scenario, ScenarioError, ScenarioEvent, ScenarioPolicy,
    ServerConfig, TimedEvent, TopologyConfig,
};
pub use sim::{
    FlServer, FlServerError, MockFlServer, MockNetworkSimulator, NetworkError, NetworkSimulator,
};
