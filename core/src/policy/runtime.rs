// Runtime rule set - cross-cutting clamps
//
// Unlike a named Policy, the runtime set applies every matching rule on each
// enforcement pass: rules here are independent clamps (battery floor forces
// epochs down, congestion forces compression on) that must all take effect
// rather than compete for a single decision. Names are unique within the
// set, and re-adding under an existing name overwrites the previous rule.

use crate::policy::rules::{
    apply_action, evaluate_condition, Condition, Context, RuleAction, RuleOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A single always-applied rule, not tied to any named policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRule {
    /// Unique name within the set
    pub name: String,

    /// Condition gating the action
    pub condition: Condition,

    /// Action applied when the condition matches
    pub action: RuleAction,
}

/// Report of one enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnforcementReport {
    /// Names of rules whose conditions matched, in set order
    pub applied: Vec<String>,

    /// (rule name, reason) pairs for rules whose action denied
    pub denials: Vec<(String, String)>,
}

/// Flat, name-keyed collection of runtime rules.
///
/// Kept as a vector so enforcement order is insertion order and therefore
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct RuntimeRuleSet {
    rules: Vec<RuntimeRule>,
}

impl RuntimeRuleSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, overwriting in place if the name already exists.
    ///
    /// Overwriting is intentional for runtime rules (a clamp is retuned by
    /// re-registering it) and is logged as a warning, not an error.
    pub fn add(&mut self, rule: RuntimeRule) {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.name == rule.name) {
            warn!(rule = %rule.name, "runtime rule overwritten");
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
    }

    /// Remove a rule by name.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        self.rules.len() != before
    }

    /// Look up a rule by name.
    pub fn get(&self, name: &str) -> Option<&RuntimeRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in enforcement order.
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Apply every matching rule to the context, in place.
    ///
    /// No short-circuit: a denying rule is recorded in the report but does
    /// not stop later rules from applying their modifications. A rule that
    /// errors is logged and skipped.
    pub fn enforce(&self, context: &mut Context) -> EnforcementReport {
        let params: HashMap<String, f64> = HashMap::new();
        let mut report = EnforcementReport::default();

        for rule in &self.rules {
            let matches = match evaluate_condition(&rule.condition, context, &params) {
                Ok(matches) => matches,
                Err(e) => {
                    debug!(rule = %rule.name, error = %e, "runtime rule condition failed; skipping");
                    continue;
                }
            };
            if !matches {
                continue;
            }

            match apply_action(&rule.action, context, &params) {
                Ok(RuleOutcome::Denied { reason }) => {
                    report.applied.push(rule.name.clone());
                    report.denials.push((rule.name.clone(), reason));
                }
                Ok(_) => report.applied.push(rule.name.clone()),
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "runtime rule action failed; skipping");
                }
            }
        }

        report
    }
}
