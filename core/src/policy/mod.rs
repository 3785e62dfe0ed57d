//! Policy subsystem - rule-based admission control
//!
//! # Overview
//!
//! Admission decisions for simulated FL rounds are made by named policies:
//! ordered rule chains evaluated against a mutable key/value context. The
//! engine is the single entry point; it owns the policies, the runtime
//! rule set, and the callback registry, and it enforces the fail-open
//! contract (a broken or missing policy can only ever allow, never error).
//!
//! # Layout
//!
//! - `rules`: the JSON rule DSL (AST, context, interpreter, validation)
//! - `chain`: the Policy rule-chain evaluator (first deny wins)
//! - `registry`: policy-kind constructors and strategy identifiers
//! - `runtime`: cross-cutting runtime clamps (every matching rule applies)
//! - `engine`: the PolicyEngine facade
//!
//! # Example
//!
//! ```rust
//! use fl_simulator_core_rs::policy::{PolicyEngine, PolicyRegistry, PolicySpec, rules::Context};
//!
//! let mut engine = PolicyEngine::new(PolicyRegistry::new());
//! engine.start();
//! engine.register_policy("resource", PolicySpec {
//!     kind: Some("resource".to_string()),
//!     ..Default::default()
//! });
//!
//! let mut ctx = Context::new();
//! ctx.insert("battery_level", 55);
//! assert!(engine.evaluate_policy("resource", &ctx).allowed);
//! ```

pub mod chain;
pub mod engine;
pub mod registry;
pub mod rules;
pub mod runtime;

// Re-export main types for convenience
pub use chain::{ChainOutcome, Policy, PolicyError};
pub use engine::{EngineStatus, EvaluationMetadata, EvaluationResult, PolicyEngine};
pub use registry::{BuiltinKind, PolicyConstructor, PolicyRegistry, PolicySpec, DEFAULT_STRATEGY};
pub use runtime::{EnforcementReport, RuntimeRule, RuntimeRuleSet};
