//! Lifecycle events, callback registry, and the recorded-event log.
//!
//! Both the policy engine and the orchestrator announce state changes
//! through a `CallbackRegistry`. Invocation is synchronous on whichever
//! thread raised the event (the worker thread for round and scenario
//! events, the caller's thread for engine lifecycle calls), so a slow
//! subscriber stalls that thread. A panicking subscriber is caught and
//! logged; the remaining subscribers still run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::error;

/// Named lifecycle events observable through `register_callback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Simulation lifecycle
    RoundStarted,
    RoundCompleted,
    SimulationCompleted,
    SimulationPaused,
    SimulationResumed,
    SimulationStopped,
    SimulationEvent,

    // Policy engine lifecycle
    PolicyRegistered,
    PolicyUnregistered,
    PolicyEvaluated,
    PolicyEvaluationCompleted,
    StrategyChanged,
    RuntimeRuleAdded,
    RuntimeRuleRemoved,
    RuntimeRulesEnforced,
}

impl EventKind {
    /// Stable snake_case identifier, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RoundStarted => "round_started",
            EventKind::RoundCompleted => "round_completed",
            EventKind::SimulationCompleted => "simulation_completed",
            EventKind::SimulationPaused => "simulation_paused",
            EventKind::SimulationResumed => "simulation_resumed",
            EventKind::SimulationStopped => "simulation_stopped",
            EventKind::SimulationEvent => "simulation_event",
            EventKind::PolicyRegistered => "policy_registered",
            EventKind::PolicyUnregistered => "policy_unregistered",
            EventKind::PolicyEvaluated => "policy_evaluated",
            EventKind::PolicyEvaluationCompleted => "policy_evaluation_completed",
            EventKind::StrategyChanged => "strategy_changed",
            EventKind::RuntimeRuleAdded => "runtime_rule_added",
            EventKind::RuntimeRuleRemoved => "runtime_rule_removed",
            EventKind::RuntimeRulesEnforced => "runtime_rules_enforced",
        }
    }
}

/// An emitted lifecycle event with its JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    pub kind: EventKind,
    pub payload: Value,
}

type Callback = Arc<dyn Fn(&SimEvent) + Send + Sync>;

/// Subscriber registry shared between caller threads and the worker.
///
/// Cloning is shallow: all clones observe the same subscriber list.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    handlers: Arc<RwLock<HashMap<EventKind, Vec<Callback>>>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an event kind.
    pub fn register(&self, kind: EventKind, callback: impl Fn(&SimEvent) + Send + Sync + 'static) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(callback));
    }

    /// Number of subscribers for an event kind.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Emit an event to all subscribers, synchronously.
    ///
    /// A panicking subscriber is caught and logged so the remaining
    /// subscribers (and the emitting thread) keep running.
    pub fn emit(&self, kind: EventKind, payload: Value) {
        let callbacks: Vec<Callback> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match handlers.get(&kind) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        let event = SimEvent { kind, payload };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!(event = kind.as_str(), "event callback panicked; continuing");
            }
        }
    }
}

// ============================================================================
// Recorded scenario events
// ============================================================================

/// A scenario event as it actually fired during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Tagged event type, e.g. "link_congestion"
    pub event_type: String,

    /// Scheduled offset from simulation start (seconds)
    pub trigger_time_seconds: f64,

    /// Observed firing offset from simulation start (seconds);
    /// always >= trigger_time_seconds
    pub fired_at_seconds: f64,

    /// Event payload as configured in the scenario
    pub details: Value,
}

/// Append-only log of fired scenario events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn log(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in firing order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records of a specific event type.
    pub fn records_of_type(&self, event_type: &str) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.event_type == event_type)
            .collect()
    }

    /// Clear all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
