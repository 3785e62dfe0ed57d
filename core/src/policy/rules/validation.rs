// Rule DSL - definition validation
//
// Safety checks run before a policy definition is admitted to an engine:
// rule name uniqueness, parameter reference integrity, bounded condition
// nesting, and non-empty composites/membership lists. Validation collects
// every problem rather than stopping at the first one.

use crate::policy::rules::types::{Condition, Operand, PolicyDef, RuleAction, RuleDef};
use thiserror::Error;

/// Maximum nesting depth for condition trees
pub const MAX_CONDITION_DEPTH: usize = 16;

/// A single validation problem in a policy definition
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Policy has no rules")]
    EmptyRuleSet,

    #[error("Duplicate rule name: {0}")]
    DuplicateRuleName(String),

    #[error("Rule {rule} references unknown parameter: {param}")]
    UnknownParameter { rule: String, param: String },

    #[error("Rule {rule} condition nesting exceeds depth {max}")]
    MaxDepthExceeded { rule: String, max: usize },

    #[error("Rule {rule} has an empty composite condition")]
    EmptyComposite { rule: String },

    #[error("Rule {rule} has an empty membership list")]
    EmptyMembershipList { rule: String },
}

/// Validate a policy definition.
///
/// Returns all problems found, or Ok(()) if the definition is admissible.
pub fn validate_def(def: &PolicyDef) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if def.rules.is_empty() {
        errors.push(ValidationError::EmptyRuleSet);
    }

    let mut seen = std::collections::HashSet::new();
    for rule in &def.rules {
        if !seen.insert(rule.name.as_str()) {
            errors.push(ValidationError::DuplicateRuleName(rule.name.clone()));
        }
        check_rule(rule, def, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rule(rule: &RuleDef, def: &PolicyDef, errors: &mut Vec<ValidationError>) {
    if rule.condition.depth() > MAX_CONDITION_DEPTH {
        errors.push(ValidationError::MaxDepthExceeded {
            rule: rule.name.clone(),
            max: MAX_CONDITION_DEPTH,
        });
    }

    check_condition(&rule.condition, rule, def, errors);

    if let RuleAction::Modify { set } = &rule.action {
        for operand in set.values() {
            check_operand(operand, rule, def, errors);
        }
    }
}

fn check_condition(
    condition: &Condition,
    rule: &RuleDef,
    def: &PolicyDef,
    errors: &mut Vec<ValidationError>,
) {
    match condition {
        Condition::Eq { left, right }
        | Condition::Neq { left, right }
        | Condition::Gt { left, right }
        | Condition::Gte { left, right }
        | Condition::Lt { left, right }
        | Condition::Lte { left, right } => {
            check_operand(left, rule, def, errors);
            check_operand(right, rule, def, errors);
        }

        Condition::In { item, set } => {
            check_operand(item, rule, def, errors);
            if set.is_empty() {
                errors.push(ValidationError::EmptyMembershipList {
                    rule: rule.name.clone(),
                });
            }
        }

        Condition::Contains { container, item } => {
            check_operand(container, rule, def, errors);
            check_operand(item, rule, def, errors);
        }

        Condition::All { conditions } | Condition::Any { conditions } => {
            if conditions.is_empty() {
                errors.push(ValidationError::EmptyComposite {
                    rule: rule.name.clone(),
                });
            }
            for child in conditions {
                check_condition(child, rule, def, errors);
            }
        }

        Condition::Not { condition } => check_condition(condition, rule, def, errors),
    }
}

fn check_operand(
    operand: &Operand,
    rule: &RuleDef,
    def: &PolicyDef,
    errors: &mut Vec<ValidationError>,
) {
    if let Operand::Param { param } = operand {
        if !def.parameters.contains_key(param) {
            errors.push(ValidationError::UnknownParameter {
                rule: rule.name.clone(),
                param: param.clone(),
            });
        }
    }
}
