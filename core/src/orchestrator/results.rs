//! Results persistence - the document written when a run ends.
//!
//! On loop exit the orchestrator serializes the run into a single JSON
//! document: scenario identity, timing, accumulated metrics, the fired
//! events, and a terminal-state block carrying a canonical SHA-256 hash of
//! the scenario configuration for replay identification.

use crate::events::EventRecord;
use crate::metrics::SimulationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// Errors raised while building or writing a results document.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scenario identity carried in the results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub description: String,
}

/// Terminal state of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalState {
    /// Reported terminal status ("stopped")
    pub status: String,

    /// Rounds completed when the loop exited
    pub rounds_completed: u32,

    /// Round budget
    pub max_rounds: u32,

    /// Canonical SHA-256 hash of the scenario configuration
    pub scenario_hash: String,
}

/// Complete results document for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub scenario: ScenarioSummary,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    pub metrics: SimulationMetrics,
    pub events: Vec<EventRecord>,
    pub final_state: FinalState,
}

impl ResultsDocument {
    /// Write the document as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<(), ResultsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Compute a deterministic SHA-256 hash of a serializable configuration.
///
/// Serializes to canonical JSON (recursively sorted object keys) first, so
/// the hash is independent of map iteration order.
pub fn compute_scenario_hash<T: Serialize>(config: &T) -> Result<String, ResultsError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let value = serde_json::to_value(config)?;
    let json = serde_json::to_string(&canonicalize(value))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
