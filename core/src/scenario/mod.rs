//! Scenario model - the static description of one simulation run.
//!
//! A scenario carries the network topology, server and client configs, the
//! ordered list of timed events, and the policies to register at load time.
//! Scenarios deserialize from JSON, are validated before loading, and are
//! immutable once loaded.

use crate::policy::registry::PolicySpec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Scenario validation problems.
#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("Failed to parse scenario JSON: {0}")]
    Parse(String),

    #[error("Scenario name must not be empty")]
    EmptyName,

    #[error("Scenario must declare at least one client")]
    NoClients,

    #[error("max_rounds must be > 0")]
    ZeroRounds,

    #[error("round_interval_seconds must be >= 0")]
    NegativeRoundInterval,

    #[error("Duplicate client id: {0}")]
    DuplicateClient(String),

    #[error("Duplicate link id: {0}")]
    DuplicateLink(String),

    #[error("Client {client} references unknown link: {link}")]
    UnknownClientLink { client: String, link: String },

    #[error("Event at {offset}s references unknown link: {link}")]
    UnknownEventLink { offset: f64, link: String },

    #[error("Event at {offset}s references unknown client: {client}")]
    UnknownEventClient { offset: f64, client: String },

    #[error("Event trigger_time_seconds must be >= 0, got {0}")]
    NegativeTrigger(f64),
}

/// One network link in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Unique link identifier, e.g. "wan_1"
    pub id: String,

    /// One-way latency (milliseconds)
    #[serde(default)]
    pub delay_ms: f64,

    /// Packet loss (percent, 0-100)
    #[serde(default)]
    pub loss_pct: f64,

    /// Bandwidth (Mbit/s)
    #[serde(default = "default_bandwidth")]
    pub bandwidth_mbps: f64,
}

fn default_bandwidth() -> f64 {
    100.0
}

/// Network topology: a named set of links clients attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub name: String,

    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

/// FL server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Aggregation strategy identifier, e.g. "fedavg"
    #[serde(default = "default_strategy")]
    pub aggregation_strategy: String,

    /// Minimum clients required per round
    #[serde(default = "default_min_clients")]
    pub min_clients: usize,

    /// Local epochs per client per round
    #[serde(default = "default_local_epochs")]
    pub local_epochs: u32,

    /// Seed for the deterministic metric trajectories
    #[serde(default = "default_seed")]
    pub rng_seed: u64,
}

fn default_strategy() -> String {
    "fedavg".to_string()
}

fn default_min_clients() -> usize {
    1
}

fn default_local_epochs() -> u32 {
    1
}

fn default_seed() -> u64 {
    42
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            aggregation_strategy: default_strategy(),
            min_clients: default_min_clients(),
            local_epochs: default_local_epochs(),
            rng_seed: default_seed(),
        }
    }
}

/// One simulated FL client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Unique client identifier
    pub id: String,

    /// Link the client is attached to (must exist in the topology)
    #[serde(default)]
    pub link: Option<String>,

    /// Local training samples
    #[serde(default = "default_dataset_size")]
    pub dataset_size: usize,

    /// Initial battery level (percent)
    #[serde(default = "default_battery")]
    pub battery_level: f64,
}

fn default_dataset_size() -> usize {
    1000
}

fn default_battery() -> f64 {
    100.0
}

/// A scenario event that mutates network or participation state.
///
/// Events are configured in JSON and fire at their offset from simulation
/// start. All firings are recorded for replay identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Degrade a link: added delay and loss, reduced bandwidth
    LinkCongestion {
        link: String,
        delay_ms: f64,
        loss_pct: f64,
        #[serde(default)]
        bandwidth_mbps: Option<f64>,
    },

    /// Set a link's added delay
    LinkDelay { link: String, delay_ms: f64 },

    /// Set a link's packet loss
    LinkLoss { link: String, loss_pct: f64 },

    /// Set a link's bandwidth
    LinkBandwidth { link: String, bandwidth_mbps: f64 },

    /// Remove a client from round participation
    ClientDropout { client: String },
}

impl ScenarioEvent {
    /// Tagged type string, matching the serde representation.
    pub fn event_type(&self) -> &'static str {
        match self {
            ScenarioEvent::LinkCongestion { .. } => "link_congestion",
            ScenarioEvent::LinkDelay { .. } => "link_delay",
            ScenarioEvent::LinkLoss { .. } => "link_loss",
            ScenarioEvent::LinkBandwidth { .. } => "link_bandwidth",
            ScenarioEvent::ClientDropout { .. } => "client_dropout",
        }
    }

    /// Event payload for records and callbacks.
    pub fn details(&self) -> serde_json::Value {
        match self {
            ScenarioEvent::LinkCongestion {
                link,
                delay_ms,
                loss_pct,
                bandwidth_mbps,
            } => json!({
                "link": link,
                "delay_ms": delay_ms,
                "loss_pct": loss_pct,
                "bandwidth_mbps": bandwidth_mbps,
            }),
            ScenarioEvent::LinkDelay { link, delay_ms } => {
                json!({"link": link, "delay_ms": delay_ms})
            }
            ScenarioEvent::LinkLoss { link, loss_pct } => {
                json!({"link": link, "loss_pct": loss_pct})
            }
            ScenarioEvent::LinkBandwidth {
                link,
                bandwidth_mbps,
            } => json!({"link": link, "bandwidth_mbps": bandwidth_mbps}),
            ScenarioEvent::ClientDropout { client } => json!({"client": client}),
        }
    }
}

/// A scenario event paired with its firing offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Offset from simulation start (seconds); fires at most once, never
    /// before this offset
    pub trigger_time_seconds: f64,

    #[serde(flatten)]
    pub event: ScenarioEvent,
}

/// A policy to register with the engine at scenario load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioPolicy {
    pub name: String,

    #[serde(flatten)]
    pub spec: PolicySpec,
}

/// Static description of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub topology: TopologyConfig,

    #[serde(default)]
    pub server: ServerConfig,

    pub clients: Vec<ClientConfig>,

    #[serde(default)]
    pub events: Vec<TimedEvent>,

    #[serde(default)]
    pub policies: Vec<ScenarioPolicy>,

    /// Round budget
    pub max_rounds: u32,

    /// Inter-round pacing (seconds); 0 runs rounds back to back
    #[serde(default = "default_round_interval")]
    pub round_interval_seconds: f64,

    /// Where the results document is written on completion
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

fn default_round_interval() -> f64 {
    0.0
}

impl Scenario {
    /// Parse a scenario from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario =
            serde_json::from_str(json).map_err(|e| ScenarioError::Parse(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName);
        }
        if self.clients.is_empty() {
            return Err(ScenarioError::NoClients);
        }
        if self.max_rounds == 0 {
            return Err(ScenarioError::ZeroRounds);
        }
        if self.round_interval_seconds < 0.0 {
            return Err(ScenarioError::NegativeRoundInterval);
        }

        let mut link_ids = std::collections::HashSet::new();
        for link in &self.topology.links {
            if !link_ids.insert(link.id.as_str()) {
                return Err(ScenarioError::DuplicateLink(link.id.clone()));
            }
        }

        let mut client_ids = std::collections::HashSet::new();
        for client in &self.clients {
            if !client_ids.insert(client.id.as_str()) {
                return Err(ScenarioError::DuplicateClient(client.id.clone()));
            }
            if let Some(link) = &client.link {
                if !link_ids.contains(link.as_str()) {
                    return Err(ScenarioError::UnknownClientLink {
                        client: client.id.clone(),
                        link: link.clone(),
                    });
                }
            }
        }

        for timed in &self.events {
            if timed.trigger_time_seconds < 0.0 {
                return Err(ScenarioError::NegativeTrigger(timed.trigger_time_seconds));
            }
            match &timed.event {
                ScenarioEvent::LinkCongestion { link, .. }
                | ScenarioEvent::LinkDelay { link, .. }
                | ScenarioEvent::LinkLoss { link, .. }
                | ScenarioEvent::LinkBandwidth { link, .. } => {
                    if !link_ids.contains(link.as_str()) {
                        return Err(ScenarioError::UnknownEventLink {
                            offset: timed.trigger_time_seconds,
                            link: link.clone(),
                        });
                    }
                }
                ScenarioEvent::ClientDropout { client } => {
                    if !client_ids.contains(client.as_str()) {
                        return Err(ScenarioError::UnknownEventClient {
                            offset: timed.trigger_time_seconds,
                            client: client.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn minimal_scenario() -> Scenario {
        Scenario {
            name: "baseline".to_string(),
            description: String::new(),
            topology: TopologyConfig {
                name: "star".to_string(),
                links: vec![LinkConfig {
                    id: "wan_1".to_string(),
                    delay_ms: 10.0,
                    loss_pct: 0.0,
                    bandwidth_mbps: 100.0,
                }],
            },
            server: ServerConfig::default(),
            clients: vec![ClientConfig {
                id: "client_1".to_string(),
                link: Some("wan_1".to_string()),
                dataset_size: 1000,
                battery_level: 100.0,
            }],
            events: vec![],
            policies: vec![],
            max_rounds: 3,
            round_interval_seconds: 0.0,
            output_path: None,
        }
    }

    #[test]
    fn test_minimal_scenario_validates() {
        assert!(minimal_scenario().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_name() {
        let mut scenario = minimal_scenario();
        scenario.name = "  ".to_string();
        assert_eq!(scenario.validate(), Err(ScenarioError::EmptyName));
    }

    #[test]
    fn test_rejects_no_clients() {
        let mut scenario = minimal_scenario();
        scenario.clients.clear();
        assert_eq!(scenario.validate(), Err(ScenarioError::NoClients));
    }

    #[test]
    fn test_rejects_zero_rounds() {
        let mut scenario = minimal_scenario();
        scenario.max_rounds = 0;
        assert_eq!(scenario.validate(), Err(ScenarioError::ZeroRounds));
    }

    #[test]
    fn test_rejects_unknown_client_link() {
        let mut scenario = minimal_scenario();
        scenario.clients[0].link = Some("nope".to_string());
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownClientLink { .. })
        ));
    }

    #[test]
    fn test_rejects_event_on_unknown_link() {
        let mut scenario = minimal_scenario();
        scenario.events.push(TimedEvent {
            trigger_time_seconds: 1.0,
            event: ScenarioEvent::LinkDelay {
                link: "nope".to_string(),
                delay_ms: 50.0,
            },
        });
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownEventLink { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_clients() {
        let mut scenario = minimal_scenario();
        let duplicate = scenario.clients[0].clone();
        scenario.clients.push(duplicate);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DuplicateClient(_))
        ));
    }

    #[test]
    fn test_event_json_tagging() {
        let json = r#"{
            "trigger_time_seconds": 1.0,
            "type": "link_congestion",
            "link": "wan_1",
            "delay_ms": 200,
            "loss_pct": 15
        }"#;
        let timed: TimedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(timed.event.event_type(), "link_congestion");
        assert_eq!(timed.trigger_time_seconds, 1.0);
    }

    #[test]
    fn test_scenario_from_json() {
        let json = r#"{
            "name": "congested_wan",
            "description": "one client behind a congested WAN link",
            "topology": {
                "name": "star",
                "links": [{"id": "wan_1", "delay_ms": 10}]
            },
            "clients": [{"id": "client_1", "link": "wan_1"}],
            "events": [{
                "trigger_time_seconds": 1,
                "type": "link_congestion",
                "link": "wan_1",
                "delay_ms": 250,
                "loss_pct": 10
            }],
            "max_rounds": 3
        }"#;

        let scenario = Scenario::from_json(json).unwrap();
        assert_eq!(scenario.name, "congested_wan");
        assert_eq!(scenario.events.len(), 1);
        assert_eq!(scenario.server.aggregation_strategy, "fedavg");
        assert_eq!(scenario.clients[0].dataset_size, 1000);
    }

    #[test]
    fn test_scenario_from_json_rejects_invalid() {
        let json = r#"{
            "name": "broken",
            "topology": {"name": "star", "links": []},
            "clients": [],
            "max_rounds": 3
        }"#;
        assert!(Scenario::from_json(json).is_err());
    }
}
