// Rule DSL - interpreter
//
// Evaluates operands, conditions, and actions against an evaluation context.
// The interpreter is total over well-formed input: every failure mode is an
// explicit RuleEvalError, which callers treat as "rule did not match".

use crate::policy::rules::context::{coerce_number, Context};
use crate::policy::rules::types::{Condition, Operand, RuleAction};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while evaluating a rule
#[derive(Debug, Error, PartialEq)]
pub enum RuleEvalError {
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Operands are not comparable as numbers")]
    NotComparable,

    #[error("Contains expects a string or array container")]
    InvalidContainer,
}

/// Tolerance for numeric equality
const EPSILON: f64 = 1e-9;

// ============================================================================
// OPERAND RESOLUTION
// ============================================================================

/// Resolve an operand to a JSON value.
///
/// Field references look into the context, parameter references into the
/// policy's parameter table, literals pass through.
pub fn resolve_operand(
    operand: &Operand,
    context: &Context,
    params: &HashMap<String, f64>,
) -> Result<Value, RuleEvalError> {
    match operand {
        Operand::Field { field } => context
            .get(field)
            .cloned()
            .ok_or_else(|| RuleEvalError::FieldNotFound(field.clone())),

        Operand::Param { param } => params
            .get(param)
            .map(|v| Value::from(*v))
            .ok_or_else(|| RuleEvalError::ParameterNotFound(param.clone())),

        Operand::Literal { value } => Ok(value.clone()),
    }
}

// ============================================================================
// CONDITION EVALUATION
// ============================================================================

/// Evaluate a condition against a context.
///
/// # Example
/// ```
/// use fl_simulator_core_rs::policy::rules::{evaluate_condition, Condition, Context, Operand};
/// use std::collections::HashMap;
///
/// let mut ctx = Context::new();
/// ctx.insert("battery_level", 10.0);
///
/// let cond = Condition::Lt {
///     left: Operand::Field { field: "battery_level".to_string() },
///     right: Operand::Literal { value: 20.into() },
/// };
/// assert!(evaluate_condition(&cond, &ctx, &HashMap::new()).unwrap());
/// ```
pub fn evaluate_condition(
    condition: &Condition,
    context: &Context,
    params: &HashMap<String, f64>,
) -> Result<bool, RuleEvalError> {
    match condition {
        Condition::Eq { left, right } => {
            let l = resolve_operand(left, context, params)?;
            let r = resolve_operand(right, context, params)?;
            Ok(values_equal(&l, &r))
        }

        Condition::Neq { left, right } => {
            let l = resolve_operand(left, context, params)?;
            let r = resolve_operand(right, context, params)?;
            Ok(!values_equal(&l, &r))
        }

        Condition::Gt { left, right } => compare_numeric(left, right, context, params, |l, r| l > r),
        Condition::Gte { left, right } => {
            compare_numeric(left, right, context, params, |l, r| l >= r)
        }
        Condition::Lt { left, right } => compare_numeric(left, right, context, params, |l, r| l < r),
        Condition::Lte { left, right } => {
            compare_numeric(left, right, context, params, |l, r| l <= r)
        }

        Condition::In { item, set } => {
            let value = resolve_operand(item, context, params)?;
            Ok(set.iter().any(|candidate| values_equal(candidate, &value)))
        }

        Condition::Contains { container, item } => {
            let container = resolve_operand(container, context, params)?;
            let item = resolve_operand(item, context, params)?;
            match container {
                Value::String(haystack) => match item.as_str() {
                    Some(needle) => Ok(haystack.contains(needle)),
                    None => Err(RuleEvalError::InvalidContainer),
                },
                Value::Array(elements) => {
                    Ok(elements.iter().any(|element| values_equal(element, &item)))
                }
                _ => Err(RuleEvalError::InvalidContainer),
            }
        }

        // Composites evaluate every child; leaf predicates are pure, so
        // evaluation order is unobservable.
        Condition::All { conditions } => {
            let mut result = true;
            for child in conditions {
                result &= evaluate_condition(child, context, params)?;
            }
            Ok(result)
        }

        Condition::Any { conditions } => {
            let mut result = false;
            for child in conditions {
                result |= evaluate_condition(child, context, params)?;
            }
            Ok(result)
        }

        Condition::Not { condition } => Ok(!evaluate_condition(condition, context, params)?),
    }
}

fn compare_numeric(
    left: &Operand,
    right: &Operand,
    context: &Context,
    params: &HashMap<String, f64>,
    cmp: impl Fn(f64, f64) -> bool,
) -> Result<bool, RuleEvalError> {
    let l = resolve_operand(left, context, params)?;
    let r = resolve_operand(right, context, params)?;
    match (coerce_number(&l), coerce_number(&r)) {
        (Some(l), Some(r)) => Ok(cmp(l, r)),
        _ => Err(RuleEvalError::NotComparable),
    }
}

/// Structural equality with epsilon tolerance for numbers.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (coerce_number(left), coerce_number(right)) {
        (Some(l), Some(r)) => (l - r).abs() < EPSILON,
        _ => left == right,
    }
}

// ============================================================================
// ACTION APPLICATION
// ============================================================================

/// Outcome of applying a single rule action.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Decision explicitly set to allow
    Allowed { reason: Option<String> },

    /// Decision set to deny; chain evaluation stops
    Denied { reason: String },

    /// Context modified; chain evaluation continues
    Modified { fields: Vec<String> },
}

/// Apply an action to the working context.
///
/// Modify actions resolve each operand first, so a failed resolution leaves
/// the context untouched.
pub fn apply_action(
    action: &RuleAction,
    context: &mut Context,
    params: &HashMap<String, f64>,
) -> Result<RuleOutcome, RuleEvalError> {
    match action {
        RuleAction::Allow { reason } => Ok(RuleOutcome::Allowed {
            reason: reason.clone(),
        }),

        RuleAction::Deny { reason } => Ok(RuleOutcome::Denied {
            reason: reason.clone(),
        }),

        RuleAction::Modify { set } => {
            let mut resolved = Map::new();
            for (field, operand) in set {
                resolved.insert(field.clone(), resolve_operand(operand, context, params)?);
            }
            let mut fields: Vec<String> = resolved.keys().cloned().collect();
            fields.sort();
            context.merge(resolved);
            Ok(RuleOutcome::Modified { fields })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> Context {
        let mut context = Context::new();
        for (key, value) in pairs {
            context.insert(*key, value.clone());
        }
        context
    }

    #[test]
    fn test_numeric_comparison_with_params() {
        let context = ctx(&[("battery_level", json!(10))]);
        let mut params = HashMap::new();
        params.insert("min_battery_level".to_string(), 20.0);

        let cond = Condition::Lt {
            left: Operand::Field {
                field: "battery_level".to_string(),
            },
            right: Operand::Param {
                param: "min_battery_level".to_string(),
            },
        };
        assert!(evaluate_condition(&cond, &context, &params).unwrap());
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let context = Context::new();
        let cond = Condition::Gt {
            left: Operand::Field {
                field: "cpu_usage".to_string(),
            },
            right: Operand::Literal { value: json!(80) },
        };
        assert_eq!(
            evaluate_condition(&cond, &context, &HashMap::new()),
            Err(RuleEvalError::FieldNotFound("cpu_usage".to_string()))
        );
    }

    #[test]
    fn test_string_equality() {
        let context = ctx(&[("client_id", json!("client_1"))]);
        let cond = Condition::Eq {
            left: Operand::Field {
                field: "client_id".to_string(),
            },
            right: Operand::Literal {
                value: json!("client_1"),
            },
        };
        assert!(evaluate_condition(&cond, &context, &HashMap::new()).unwrap());
    }

    #[test]
    fn test_in_membership() {
        let context = ctx(&[("client_id", json!("client_3"))]);
        let cond = Condition::In {
            item: Operand::Field {
                field: "client_id".to_string(),
            },
            set: vec![json!("client_3"), json!("client_7")],
        };
        assert!(evaluate_condition(&cond, &context, &HashMap::new()).unwrap());
    }

    #[test]
    fn test_contains_string_and_array() {
        let context = ctx(&[
            ("reason", json!("link congestion on wan_1")),
            ("excluded_clients", json!(["client_2", "client_5"])),
            ("client_id", json!("client_5")),
        ]);

        let substring = Condition::Contains {
            container: Operand::Field {
                field: "reason".to_string(),
            },
            item: Operand::Literal {
                value: json!("congestion"),
            },
        };
        assert!(evaluate_condition(&substring, &context, &HashMap::new()).unwrap());

        let membership = Condition::Contains {
            container: Operand::Field {
                field: "excluded_clients".to_string(),
            },
            item: Operand::Field {
                field: "client_id".to_string(),
            },
        };
        assert!(evaluate_condition(&membership, &context, &HashMap::new()).unwrap());
    }

    #[test]
    fn test_contains_rejects_scalar_container() {
        let context = ctx(&[("battery_level", json!(10))]);
        let cond = Condition::Contains {
            container: Operand::Field {
                field: "battery_level".to_string(),
            },
            item: Operand::Literal { value: json!(1) },
        };
        assert_eq!(
            evaluate_condition(&cond, &context, &HashMap::new()),
            Err(RuleEvalError::InvalidContainer)
        );
    }

    #[test]
    fn test_composites() {
        let context = ctx(&[("battery_level", json!(50)), ("latency_ms", json!(30))]);
        let params = HashMap::new();

        let all = Condition::All {
            conditions: vec![
                Condition::Gt {
                    left: Operand::Field {
                        field: "battery_level".to_string(),
                    },
                    right: Operand::Literal { value: json!(20) },
                },
                Condition::Lt {
                    left: Operand::Field {
                        field: "latency_ms".to_string(),
                    },
                    right: Operand::Literal { value: json!(100) },
                },
            ],
        };
        assert!(evaluate_condition(&all, &context, &params).unwrap());

        let negated = Condition::Not {
            condition: Box::new(all),
        };
        assert!(!evaluate_condition(&negated, &context, &params).unwrap());

        let any = Condition::Any {
            conditions: vec![
                Condition::Gt {
                    left: Operand::Field {
                        field: "battery_level".to_string(),
                    },
                    right: Operand::Literal { value: json!(90) },
                },
                Condition::Lt {
                    left: Operand::Field {
                        field: "latency_ms".to_string(),
                    },
                    right: Operand::Literal { value: json!(100) },
                },
            ],
        };
        assert!(evaluate_condition(&any, &context, &params).unwrap());
    }

    #[test]
    fn test_composite_error_propagates() {
        // A missing field inside a composite surfaces as an error, which the
        // chain evaluator downgrades to "did not match".
        let context = ctx(&[("battery_level", json!(50))]);
        let cond = Condition::All {
            conditions: vec![
                Condition::Gt {
                    left: Operand::Field {
                        field: "battery_level".to_string(),
                    },
                    right: Operand::Literal { value: json!(20) },
                },
                Condition::Gt {
                    left: Operand::Field {
                        field: "missing".to_string(),
                    },
                    right: Operand::Literal { value: json!(0) },
                },
            ],
        };
        assert!(evaluate_condition(&cond, &context, &HashMap::new()).is_err());
    }

    #[test]
    fn test_modify_merges_fields() {
        let mut context = ctx(&[("epochs", json!(5))]);
        let mut set = HashMap::new();
        set.insert("epochs".to_string(), Operand::Literal { value: json!(1) });
        set.insert(
            "low_power_mode".to_string(),
            Operand::Literal { value: json!(true) },
        );

        let outcome =
            apply_action(&RuleAction::Modify { set }, &mut context, &HashMap::new()).unwrap();
        match outcome {
            RuleOutcome::Modified { fields } => {
                assert_eq!(fields, vec!["epochs".to_string(), "low_power_mode".to_string()]);
            }
            other => panic!("expected Modified, got {:?}", other),
        }
        assert_eq!(context.get_number("epochs").unwrap(), 1.0);
    }

    #[test]
    fn test_modify_with_unresolved_operand_leaves_context_untouched() {
        let mut context = ctx(&[("epochs", json!(5))]);
        let mut set = HashMap::new();
        set.insert("epochs".to_string(), Operand::Literal { value: json!(1) });
        set.insert(
            "copied".to_string(),
            Operand::Field {
                field: "missing".to_string(),
            },
        );

        let result = apply_action(&RuleAction::Modify { set }, &mut context, &HashMap::new());
        assert!(result.is_err());
        assert_eq!(context.get_number("epochs").unwrap(), 5.0);
    }

    #[test]
    fn test_deny_outcome() {
        let mut context = Context::new();
        let outcome = apply_action(
            &RuleAction::Deny {
                reason: "Battery level too low".to_string(),
            },
            &mut context,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            RuleOutcome::Denied {
                reason: "Battery level too low".to_string()
            }
        );
    }
}
