// Policy - ordered rule chain evaluator
//
// A Policy is a validated PolicyDef plus the evaluation state machine:
// rules run in registration order against a working copy of the input
// context, the first deny wins, and a rule whose condition or action fails
// is logged and treated as not matched.

use crate::policy::rules::{
    apply_action, evaluate_condition, validate_def, Condition, Context, PolicyDef, RuleAction,
    RuleDef, RuleOutcome, ValidationError,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when constructing a Policy
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to parse policy JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Policy validation failed: {0:?}")]
    ValidationError(Vec<ValidationError>),
}

/// Outcome of evaluating one policy against one context.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// Final decision; defaults to allow when no rule settles it
    pub allowed: bool,

    /// Reason attached by the deciding rule, if any
    pub reason: Option<String>,

    /// Working context after all applied modifications
    pub context: Context,

    /// Number of rules whose conditions were evaluated
    pub rules_evaluated: usize,

    /// Names of rules whose conditions matched
    pub matched_rules: Vec<String>,
}

/// A named, ordered admission-control rule chain.
///
/// # Example
/// ```
/// use fl_simulator_core_rs::policy::{Policy, rules::Context};
///
/// let json = r#"{
///     "version": "1.0",
///     "name": "resource",
///     "parameters": {"min_battery_level": 20},
///     "rules": [{
///         "name": "battery_floor",
///         "condition": {
///             "op": "<",
///             "left": {"field": "battery_level"},
///             "right": {"param": "min_battery_level"}
///         },
///         "action": {"action": "deny", "reason": "Battery level too low"}
///     }]
/// }"#;
///
/// let policy = Policy::from_json(json).unwrap();
/// let mut ctx = Context::new();
/// ctx.insert("battery_level", 10);
/// assert!(!policy.evaluate(&ctx).allowed);
/// ```
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    description: Option<String>,
    parameters: HashMap<String, f64>,
    rules: Vec<RuleDef>,
}

impl Policy {
    /// Create a policy with no rules.
    ///
    /// An empty chain always allows; rules are appended later via
    /// `push_rule` (the engine's `add_rule` path).
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Build a policy from a definition, validating it first.
    pub fn from_def(def: PolicyDef) -> Result<Self, PolicyError> {
        validate_def(&def).map_err(PolicyError::ValidationError)?;
        Ok(Self {
            name: def.name,
            description: def.description,
            parameters: def.parameters,
            rules: def.rules,
        })
    }

    /// Build a policy from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let def: PolicyDef = serde_json::from_str(json)?;
        Self::from_def(def)
    }

    /// Policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Number of rules in the chain.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Ordered rule list.
    pub fn rules(&self) -> &[RuleDef] {
        &self.rules
    }

    /// Parameter table.
    pub fn parameters(&self) -> &HashMap<String, f64> {
        &self.parameters
    }

    /// Rename the policy (registration name wins over the document name).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overlay parameters onto the definition's defaults.
    pub fn with_parameters(&mut self, overrides: HashMap<String, f64>) {
        for (key, value) in overrides {
            self.parameters.insert(key, value);
        }
    }

    /// Append a rule at the end of the chain.
    ///
    /// Registration order is evaluation order, so appended rules run last.
    pub fn push_rule(&mut self, condition: Condition, action: RuleAction) {
        let name = format!("rule_{}", self.rules.len() + 1);
        self.rules.push(RuleDef {
            name,
            description: None,
            condition,
            action,
        });
    }

    /// Evaluate the chain against a context.
    ///
    /// Works on a copy of the input; the caller's context is never mutated.
    /// The first rule whose action denies stops evaluation; later rules
    /// never run. A rule that errors (missing field, bad types) counts as
    /// not matched and the chain continues.
    pub fn evaluate(&self, input: &Context) -> ChainOutcome {
        let mut working = input.clone();
        let mut allowed = true;
        let mut reason: Option<String> = None;
        let mut rules_evaluated = 0;
        let mut matched_rules = Vec::new();

        for rule in &self.rules {
            rules_evaluated += 1;

            let matches = match evaluate_condition(&rule.condition, &working, &self.parameters) {
                Ok(matches) => matches,
                Err(e) => {
                    debug!(
                        policy = %self.name,
                        rule = %rule.name,
                        error = %e,
                        "rule condition failed to evaluate; treating as not matched"
                    );
                    false
                }
            };

            if !matches {
                continue;
            }
            matched_rules.push(rule.name.clone());

            match apply_action(&rule.action, &mut working, &self.parameters) {
                Ok(RuleOutcome::Allowed { reason: r }) => {
                    allowed = true;
                    reason = r;
                }
                Ok(RuleOutcome::Denied { reason: r }) => {
                    allowed = false;
                    reason = Some(r);
                    break;
                }
                Ok(RuleOutcome::Modified { .. }) => {}
                Err(e) => {
                    warn!(
                        policy = %self.name,
                        rule = %rule.name,
                        error = %e,
                        "rule action failed; skipping rule"
                    );
                }
            }
        }

        ChainOutcome {
            allowed,
            reason,
            context: working,
            rules_evaluated,
            matched_rules,
        }
    }
}
