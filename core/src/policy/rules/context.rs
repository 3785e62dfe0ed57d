// Evaluation context for rule conditions and actions.
//
// The context is the only mutable scope a rule may affect: conditions read
// from it, Modify actions merge fields back into it. Values are plain JSON
// so contexts can be built from scenario configs, client telemetry, or test
// fixtures without a fixed schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while reading typed values out of a context.
#[derive(Debug, Error, PartialEq)]
pub enum ContextError {
    #[error("Field not found: {0}")]
    MissingField(String),

    #[error("Field {field} is not a {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
}

/// Mutable string-keyed map threaded through policy evaluation.
///
/// # Example
/// ```
/// use fl_simulator_core_rs::policy::rules::Context;
///
/// let mut ctx = Context::new();
/// ctx.insert("battery_level", 42.0);
/// assert_eq!(ctx.get_number("battery_level").unwrap(), 42.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: Map<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object value.
    ///
    /// Non-object values are rejected: rules address fields by name.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(entries) => Some(Self { entries }),
            _ => None,
        }
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a field as a number, coercing booleans (true = 1.0).
    pub fn get_number(&self, key: &str) -> Result<f64, ContextError> {
        let value = self
            .get(key)
            .ok_or_else(|| ContextError::MissingField(key.to_string()))?;
        coerce_number(value).ok_or(ContextError::TypeMismatch {
            field: key.to_string(),
            expected: "number",
        })
    }

    /// Get a field as a string slice.
    pub fn get_str(&self, key: &str) -> Result<&str, ContextError> {
        self.get(key)
            .ok_or_else(|| ContextError::MissingField(key.to_string()))?
            .as_str()
            .ok_or(ContextError::TypeMismatch {
                field: key.to_string(),
                expected: "string",
            })
    }

    /// Get a field as a boolean.
    pub fn get_bool(&self, key: &str) -> Result<bool, ContextError> {
        self.get(key)
            .ok_or_else(|| ContextError::MissingField(key.to_string()))?
            .as_bool()
            .ok_or(ContextError::TypeMismatch {
                field: key.to_string(),
                expected: "boolean",
            })
    }

    /// Check whether a field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of fields in the context.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the context has no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (field, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Merge another set of fields into this context, overwriting on clash.
    pub fn merge(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            self.entries.insert(key, value);
        }
    }

    /// View the underlying JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

/// Numeric coercion shared by the interpreter: numbers pass through,
/// booleans map to 1.0/0.0, everything else is not a number.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
