// Policy registry and factory
//
// Maps policy-kind tags to constructors. Built-in kinds are embedded JSON
// documents resolved through a closed enum; custom kinds are user-supplied
// constructor closures. The registry also owns the known aggregation
// strategy identifiers. Registries are plain values constructed once and
// injected into each engine, so independent engines can coexist in one
// process.

use crate::policy::chain::{Policy, PolicyError};
use crate::policy::rules::{PolicyDef, RuleDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Specification handed to `PolicyEngine::register_policy`.
///
/// `kind` selects a registered constructor; when absent or unknown the
/// engine falls back to a generic rule-based policy built from `rules`.
/// `parameters` overlay the selected kind's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: HashMap<String, f64>,

    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// Constructor for a custom policy kind.
pub type PolicyConstructor = Box<dyn Fn(&str, &PolicySpec) -> Result<Policy, PolicyError> + Send + Sync>;

/// Closed set of built-in policy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinKind {
    /// Device-resource admission gate (battery, CPU)
    Resource,

    /// Link-quality admission gate (latency, loss, bandwidth)
    NetworkQos,

    /// Identity/data admission gate (exclusion list, dataset size)
    ClientEligibility,
}

impl BuiltinKind {
    /// Parse a kind tag, `None` for unknown tags.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "resource" => Some(BuiltinKind::Resource),
            "network_qos" => Some(BuiltinKind::NetworkQos),
            "client_eligibility" => Some(BuiltinKind::ClientEligibility),
            _ => None,
        }
    }

    /// The embedded JSON policy document for this kind.
    fn document(&self) -> &'static str {
        match self {
            BuiltinKind::Resource => include_str!("../../policies/resource_guard.json"),
            BuiltinKind::NetworkQos => include_str!("../../policies/network_qos.json"),
            BuiltinKind::ClientEligibility => {
                include_str!("../../policies/client_eligibility.json")
            }
        }
    }
}

/// Default aggregation strategy identifier.
pub const DEFAULT_STRATEGY: &str = "fedavg";

/// Registry of policy constructors and aggregation strategies.
pub struct PolicyRegistry {
    custom: HashMap<String, PolicyConstructor>,
    strategies: Vec<String>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyRegistry {
    /// Create a registry with the built-in kinds and strategies.
    pub fn new() -> Self {
        Self {
            custom: HashMap::new(),
            strategies: vec!["fedavg".to_string(), "fedprox".to_string()],
        }
    }

    /// Register a custom policy-kind constructor.
    ///
    /// A custom kind shadows a built-in kind with the same tag.
    pub fn register_custom(&mut self, kind: impl Into<String>, constructor: PolicyConstructor) {
        self.custom.insert(kind.into(), constructor);
    }

    /// Whether a kind tag resolves to a constructor (custom or built-in).
    pub fn knows_kind(&self, kind: &str) -> bool {
        self.custom.contains_key(kind) || BuiltinKind::parse(kind).is_some()
    }

    /// Register an additional aggregation strategy identifier.
    pub fn register_strategy(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.strategies.contains(&name) {
            self.strategies.push(name);
        }
    }

    /// Whether a strategy identifier is known.
    pub fn has_strategy(&self, name: &str) -> bool {
        self.strategies.iter().any(|s| s == name)
    }

    /// Known strategy identifiers.
    pub fn strategies(&self) -> &[String] {
        &self.strategies
    }

    /// Construct a policy named `name` from a spec.
    ///
    /// Resolution order: custom constructor, built-in kind, generic
    /// rule-based fallback. An unknown kind is not an error; the generic
    /// fallback is used so registration never fails hard on the tag.
    pub fn create(&self, name: &str, spec: &PolicySpec) -> Result<Policy, PolicyError> {
        if let Some(kind) = spec.kind.as_deref() {
            if let Some(constructor) = self.custom.get(kind) {
                return constructor(name, spec);
            }
            if let Some(builtin) = BuiltinKind::parse(kind) {
                return build_builtin(builtin, name, spec);
            }
            debug!(kind, name, "unknown policy kind; using generic rule-based policy");
        }
        build_generic(name, spec)
    }
}

fn build_builtin(kind: BuiltinKind, name: &str, spec: &PolicySpec) -> Result<Policy, PolicyError> {
    let mut policy = Policy::from_json(kind.document())?.with_name(name);
    policy.with_parameters(spec.parameters.clone());
    Ok(policy)
}

fn build_generic(name: &str, spec: &PolicySpec) -> Result<Policy, PolicyError> {
    if spec.rules.is_empty() {
        // An empty chain is a valid starting point: rules arrive later via
        // PolicyEngine::add_rule.
        let mut policy = Policy::empty(name);
        policy.with_parameters(spec.parameters.clone());
        return Ok(policy);
    }
    Policy::from_def(PolicyDef {
        version: "1.0".to_string(),
        name: name.to_string(),
        description: spec.description.clone(),
        parameters: spec.parameters.clone(),
        rules: spec.rules.clone(),
    })
}
