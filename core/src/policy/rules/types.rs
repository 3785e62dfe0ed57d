// Rule DSL - type definitions
//
// JSON rule format for admission-control policies. A policy is an ordered
// list of (condition, action) rules; conditions are a small boolean AST and
// actions either settle the decision (Allow/Deny) or merge fields into the
// working context (Modify). All types deserialize from JSON and are
// validated before first use, so policies are data: editable, diffable, and
// portable without runtime code generation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// OPERANDS
// ============================================================================

/// A value position in a condition or Modify action.
///
/// Can be a field reference into the evaluation context, a reference to a
/// named policy parameter, or a literal JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// Reference to a field in the evaluation context
    /// Examples: "battery_level", "latency_ms", "client_id"
    Field { field: String },

    /// Reference to a named policy parameter
    /// Examples: "min_battery_level", "max_latency_ms"
    Param { param: String },

    /// Literal value (number, string, boolean, array)
    Literal { value: serde_json::Value },
}

// ============================================================================
// CONDITIONS
// ============================================================================

/// Boolean condition over an evaluation context.
///
/// Comparison operators coerce both sides to f64 where possible; `==`/`!=`
/// also compare strings, booleans, and other JSON values structurally.
/// Composite operators evaluate every child (leaf predicates are pure, so
/// there is nothing to short-circuit around).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Condition {
    /// Equal (epsilon tolerance for numbers)
    #[serde(rename = "==")]
    Eq { left: Operand, right: Operand },

    /// Not equal
    #[serde(rename = "!=")]
    Neq { left: Operand, right: Operand },

    /// Greater than
    #[serde(rename = ">")]
    Gt { left: Operand, right: Operand },

    /// Greater than or equal
    #[serde(rename = ">=")]
    Gte { left: Operand, right: Operand },

    /// Less than
    #[serde(rename = "<")]
    Lt { left: Operand, right: Operand },

    /// Less than or equal
    #[serde(rename = "<=")]
    Lte { left: Operand, right: Operand },

    /// Membership in a literal list
    #[serde(rename = "in")]
    In {
        item: Operand,
        set: Vec<serde_json::Value>,
    },

    /// Substring match (string container) or element match (array container)
    #[serde(rename = "contains")]
    Contains { container: Operand, item: Operand },

    /// Logical AND over all children
    #[serde(rename = "all")]
    All { conditions: Vec<Condition> },

    /// Logical OR over all children
    #[serde(rename = "any")]
    Any { conditions: Vec<Condition> },

    /// Logical NOT
    #[serde(rename = "not")]
    Not { condition: Box<Condition> },
}

impl Condition {
    /// Maximum nesting depth of this condition tree.
    pub fn depth(&self) -> usize {
        match self {
            Condition::All { conditions } | Condition::Any { conditions } => {
                1 + conditions.iter().map(Condition::depth).max().unwrap_or(0)
            }
            Condition::Not { condition } => 1 + condition.depth(),
            _ => 1,
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Action taken when a rule's condition matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleAction {
    /// Explicitly allow, optionally recording a reason
    Allow {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Deny with a reason; evaluation of the policy stops here
    Deny { reason: String },

    /// Merge fields into the working context; evaluation continues
    Modify { set: HashMap<String, Operand> },
}

// ============================================================================
// RULES AND POLICY DEFINITIONS
// ============================================================================

/// A single (condition, action) rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    /// Unique rule identifier within the policy
    pub name: String,

    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Condition gating the action
    pub condition: Condition,

    /// Action applied when the condition matches
    pub action: RuleAction,
}

/// Complete policy definition.
///
/// This is the root object deserialized from JSON policy documents. Rule
/// order is evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDef {
    /// Schema version (currently "1.0")
    pub version: String,

    /// Policy identifier
    pub name: String,

    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Named parameters (thresholds, constants)
    #[serde(default)]
    pub parameters: HashMap<String, f64>,

    /// Ordered rule list
    pub rules: Vec<RuleDef>,
}
