// Policy engine - evaluation entry point and lifecycle control
//
// Owns the named policies, the runtime rule set, the enabled flag, and the
// callback registry. Every public method follows the control-plane contract:
// fail open, log loud. Nothing in here panics toward the caller or returns
// an Err; configuration problems become `false` returns and evaluation
// problems degrade to permissive results.

use crate::events::{CallbackRegistry, EventKind};
use crate::policy::chain::{ChainOutcome, Policy};
use crate::policy::registry::{PolicyRegistry, PolicySpec, DEFAULT_STRATEGY};
use crate::policy::rules::{Condition, Context, RuleAction};
use crate::policy::runtime::{EnforcementReport, RuntimeRule, RuntimeRuleSet};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one policy evaluation, as seen by callers.
///
/// Always produced: the fail-open contract means a disabled engine, an
/// unregistered policy, or an evaluation failure all yield a permissive
/// result with a reason, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    /// Final decision
    pub allowed: bool,

    /// Reason attached by the deciding rule or the fail-open path
    pub reason: Option<String>,

    /// Working context after evaluation (input copy plus modifications)
    pub context: Context,

    /// Evaluation metadata
    pub metadata: EvaluationMetadata,
}

/// Metadata attached to every evaluation result.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationMetadata {
    /// Policy that produced the result
    pub policy: String,

    /// Unique id for this evaluation
    pub evaluation_id: Uuid,

    /// Number of rule conditions evaluated
    pub rules_evaluated: usize,

    /// Names of rules whose conditions matched
    pub matched_rules: Vec<String>,
}

/// Engine status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub policy_count: usize,
    pub policies: Vec<String>,
    pub runtime_rule_count: usize,
    pub strategy: String,
    pub evaluations: u64,
}

/// Rule-based admission-control engine.
///
/// # Example
/// ```
/// use fl_simulator_core_rs::policy::{PolicyEngine, PolicyRegistry, PolicySpec, rules::Context};
///
/// let mut engine = PolicyEngine::new(PolicyRegistry::new());
/// engine.start();
/// engine.register_policy("resource", PolicySpec {
///     kind: Some("resource".to_string()),
///     ..Default::default()
/// });
///
/// let mut ctx = Context::new();
/// ctx.insert("battery_level", 10);
/// assert!(!engine.evaluate_policy("resource", &ctx).allowed);
/// ```
pub struct PolicyEngine {
    enabled: bool,
    policies: HashMap<String, Policy>,
    registration_order: Vec<String>,
    runtime_rules: RuntimeRuleSet,
    registry: PolicyRegistry,
    callbacks: CallbackRegistry,
    strategy: String,
    evaluations: u64,
}

impl PolicyEngine {
    /// Create an engine around an injected registry. Starts disabled.
    pub fn new(registry: PolicyRegistry) -> Self {
        Self {
            enabled: false,
            policies: HashMap::new(),
            registration_order: Vec::new(),
            runtime_rules: RuntimeRuleSet::new(),
            registry,
            callbacks: CallbackRegistry::new(),
            strategy: DEFAULT_STRATEGY.to_string(),
            evaluations: 0,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Enable evaluation. Idempotent.
    pub fn start(&mut self) -> bool {
        if !self.enabled {
            info!("policy engine started");
        }
        self.enabled = true;
        true
    }

    /// Disable evaluation. Idempotent. Registered policies are kept.
    pub fn stop(&mut self) -> bool {
        if self.enabled {
            info!("policy engine stopped");
        }
        self.enabled = false;
        true
    }

    /// Whether the engine is currently enabled.
    pub fn is_running(&self) -> bool {
        self.enabled
    }

    /// Subscribe to engine lifecycle events.
    pub fn register_callback(
        &self,
        kind: EventKind,
        callback: impl Fn(&crate::events::SimEvent) + Send + Sync + 'static,
    ) {
        self.callbacks.register(kind, callback);
    }

    /// The callback registry (shared with clones).
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    // ========================================================================
    // Policy management
    // ========================================================================

    /// Register a policy under a unique name.
    ///
    /// Returns false if the name is taken or the spec does not produce a
    /// valid policy; the previously registered policy is left intact.
    /// Unknown kinds fall back to a generic rule-based policy and do not
    /// fail registration.
    pub fn register_policy(&mut self, name: &str, spec: PolicySpec) -> bool {
        if self.policies.contains_key(name) {
            warn!(policy = name, "policy already registered");
            return false;
        }

        // Custom constructors are caller-supplied closures; a panicking
        // constructor must not take the engine down.
        let built = catch_unwind(AssertUnwindSafe(|| self.registry.create(name, &spec)));
        let policy = match built {
            Ok(Ok(policy)) => policy,
            Ok(Err(e)) => {
                warn!(policy = name, error = %e, "policy registration failed");
                return false;
            }
            Err(_) => {
                warn!(policy = name, "policy constructor panicked");
                return false;
            }
        };

        let rule_count = policy.rule_count();
        self.policies.insert(name.to_string(), policy);
        self.registration_order.push(name.to_string());
        self.callbacks.emit(
            EventKind::PolicyRegistered,
            json!({"policy": name, "kind": spec.kind, "rules": rule_count}),
        );
        true
    }

    /// Remove a policy by name.
    pub fn unregister_policy(&mut self, name: &str) -> bool {
        if self.policies.remove(name).is_none() {
            warn!(policy = name, "cannot unregister unknown policy");
            return false;
        }
        self.registration_order.retain(|n| n != name);
        self.callbacks
            .emit(EventKind::PolicyUnregistered, json!({"policy": name}));
        true
    }

    /// Append a rule to a registered policy's chain.
    pub fn add_rule(&mut self, policy_name: &str, condition: Condition, action: RuleAction) -> bool {
        match self.policies.get_mut(policy_name) {
            Some(policy) => {
                policy.push_rule(condition, action);
                true
            }
            None => {
                warn!(policy = policy_name, "cannot add rule to unknown policy");
                false
            }
        }
    }

    /// Names of registered policies, in registration order.
    pub fn policy_names(&self) -> Vec<String> {
        self.registration_order.clone()
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate a named policy against a context.
    ///
    /// Fail-open: a disabled engine, an unknown name, or a failure inside
    /// the policy all produce `allowed=true` with a reason.
    pub fn evaluate_policy(&mut self, name: &str, context: &Context) -> EvaluationResult {
        if !self.enabled {
            return permissive(name, context, "policy engine is disabled");
        }

        let Some(policy) = self.policies.get(name) else {
            warn!(policy = name, "evaluating unregistered policy; allowing by default");
            return permissive(name, context, "policy not registered");
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| policy.evaluate(context)));
        let result = match outcome {
            Ok(outcome) => from_outcome(name, outcome),
            Err(_) => {
                warn!(policy = name, "policy evaluation panicked; allowing by default");
                permissive(name, context, "policy evaluation failed")
            }
        };

        self.evaluations += 1;
        self.callbacks.emit(
            EventKind::PolicyEvaluated,
            json!({
                "policy": name,
                "allowed": result.allowed,
                "reason": result.reason.clone(),
                "evaluation_id": result.metadata.evaluation_id,
            }),
        );
        result
    }

    /// Evaluate every registered policy against a context.
    ///
    /// Policies run in registration order; a failing policy degrades to a
    /// permissive result without affecting the others.
    pub fn evaluate_policies(&mut self, context: &Context) -> Vec<EvaluationResult> {
        let names = self.registration_order.clone();
        let results: Vec<EvaluationResult> = names
            .iter()
            .map(|name| self.evaluate_policy(name, context))
            .collect();

        self.callbacks.emit(
            EventKind::PolicyEvaluationCompleted,
            json!({
                "policies": names,
                "denied": results.iter().filter(|r| !r.allowed).count(),
            }),
        );
        results
    }

    // ========================================================================
    // Runtime rules
    // ========================================================================

    /// Add (or overwrite) a runtime rule.
    pub fn add_runtime_rule(&mut self, rule: RuntimeRule) -> bool {
        let name = rule.name.clone();
        self.runtime_rules.add(rule);
        self.callbacks
            .emit(EventKind::RuntimeRuleAdded, json!({"rule": name}));
        true
    }

    /// Remove a runtime rule by name.
    pub fn remove_runtime_rule(&mut self, name: &str) -> bool {
        if !self.runtime_rules.remove(name) {
            warn!(rule = name, "cannot remove unknown runtime rule");
            return false;
        }
        self.callbacks
            .emit(EventKind::RuntimeRuleRemoved, json!({"rule": name}));
        true
    }

    /// Apply all matching runtime rules to the context, in place.
    pub fn enforce_runtime_rules(&mut self, context: &mut Context) -> EnforcementReport {
        let report = self.runtime_rules.enforce(context);
        self.callbacks.emit(
            EventKind::RuntimeRulesEnforced,
            json!({
                "applied": report.applied.clone(),
                "denials": report.denials.len(),
            }),
        );
        report
    }

    /// The runtime rule set.
    pub fn runtime_rules(&self) -> &RuntimeRuleSet {
        &self.runtime_rules
    }

    // ========================================================================
    // Strategy
    // ========================================================================

    /// Switch the active aggregation-strategy identifier.
    ///
    /// Returns false (and fires nothing) if the registry does not know the
    /// strategy.
    pub fn set_strategy(&mut self, name: &str) -> bool {
        if !self.registry.has_strategy(name) {
            warn!(strategy = name, "unknown aggregation strategy");
            return false;
        }
        if self.strategy != name {
            let previous = std::mem::replace(&mut self.strategy, name.to_string());
            self.callbacks.emit(
                EventKind::StrategyChanged,
                json!({"from": previous, "to": name}),
            );
        }
        true
    }

    /// The active aggregation-strategy identifier.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Snapshot of the engine state.
    pub fn get_status(&self) -> EngineStatus {
        EngineStatus {
            enabled: self.enabled,
            policy_count: self.policies.len(),
            policies: self.registration_order.clone(),
            runtime_rule_count: self.runtime_rules.len(),
            strategy: self.strategy.clone(),
            evaluations: self.evaluations,
        }
    }
}

fn from_outcome(policy: &str, outcome: ChainOutcome) -> EvaluationResult {
    EvaluationResult {
        allowed: outcome.allowed,
        reason: outcome.reason,
        context: outcome.context,
        metadata: EvaluationMetadata {
            policy: policy.to_string(),
            evaluation_id: Uuid::new_v4(),
            rules_evaluated: outcome.rules_evaluated,
            matched_rules: outcome.matched_rules,
        },
    }
}

fn permissive(policy: &str, context: &Context, reason: &str) -> EvaluationResult {
    EvaluationResult {
        allowed: true,
        reason: Some(reason.to_string()),
        context: context.clone(),
        metadata: EvaluationMetadata {
            policy: policy.to_string(),
            evaluation_id: Uuid::new_v4(),
            rules_evaluated: 0,
            matched_rules: Vec::new(),
        },
    }
}
