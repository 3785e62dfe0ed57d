// Rule DSL for admission-control policies
//
// JSON-based rules that can be edited, validated, and interpreted without
// runtime code generation.
//
// Architecture:
// - types.rs: AST definitions (Operand, Condition, RuleAction, PolicyDef)
// - context.rs: evaluation context (string-keyed JSON fields)
// - interpreter.rs: pure evaluator (conditions, actions)
// - validation.rs: admission checks (uniqueness, references, depth)

pub mod context;
pub mod interpreter;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use context::{Context, ContextError};
pub use interpreter::{
    apply_action, evaluate_condition, resolve_operand, RuleEvalError, RuleOutcome,
};
pub use types::{Condition, Operand, PolicyDef, RuleAction, RuleDef};
pub use validation::{validate_def, ValidationError, MAX_CONDITION_DEPTH};
