// Network simulator collaborator
//
// The orchestrator drives the network only through this trait, so a GNS3 or
// SDN-backed implementation can replace the in-process mock without
// orchestrator changes. Link mutations are last-write-wins: setting a
// parameter twice leaves the later value.

use crate::metrics::NetworkMetrics;
use crate::scenario::{ClientConfig, TopologyConfig};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by network simulator implementations.
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("Unknown link: {0}")]
    UnknownLink(String),

    #[error("No topology has been created")]
    NoTopology,

    #[error("Duplicate client node: {0}")]
    DuplicateClient(String),
}

/// Interface between the orchestrator and the simulated network.
pub trait NetworkSimulator: Send {
    /// Create (or replace) the topology.
    fn create_topology(&mut self, topology: &TopologyConfig) -> Result<(), NetworkError>;

    /// Start the network simulation.
    fn start_simulation(&mut self) -> Result<(), NetworkError>;

    /// Stop the network simulation.
    fn stop_simulation(&mut self);

    /// Set the added delay on a link (milliseconds).
    fn add_link_delay(&mut self, link: &str, delay_ms: f64) -> Result<(), NetworkError>;

    /// Set the packet loss on a link (percent).
    fn add_link_loss(&mut self, link: &str, loss_pct: f64) -> Result<(), NetworkError>;

    /// Set the bandwidth of a link (Mbit/s).
    fn set_link_bandwidth(&mut self, link: &str, bandwidth_mbps: f64) -> Result<(), NetworkError>;

    /// Attach a client node to the topology.
    fn add_client_node(&mut self, client: &ClientConfig) -> Result<(), NetworkError>;

    /// Current aggregate performance snapshot.
    fn get_performance_metrics(&self) -> NetworkMetrics;
}

#[derive(Debug, Clone, Default)]
struct LinkState {
    delay_ms: f64,
    loss_pct: f64,
    bandwidth_mbps: f64,
}

/// In-process network simulator.
///
/// Tracks per-link parameters and aggregates them into `NetworkMetrics`.
/// Suitable for tests and for standalone runs without an external network
/// emulator.
#[derive(Debug, Default)]
pub struct MockNetworkSimulator {
    topology_name: Option<String>,
    links: HashMap<String, LinkState>,
    clients: Vec<String>,
    started: bool,
}

impl MockNetworkSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the simulation is currently started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    fn link_mut(&mut self, link: &str) -> Result<&mut LinkState, NetworkError> {
        self.links
            .get_mut(link)
            .ok_or_else(|| NetworkError::UnknownLink(link.to_string()))
    }
}

impl NetworkSimulator for MockNetworkSimulator {
    fn create_topology(&mut self, topology: &TopologyConfig) -> Result<(), NetworkError> {
        self.links = topology
            .links
            .iter()
            .map(|link| {
                (
                    link.id.clone(),
                    LinkState {
                        delay_ms: link.delay_ms,
                        loss_pct: link.loss_pct,
                        bandwidth_mbps: link.bandwidth_mbps,
                    },
                )
            })
            .collect();
        self.clients.clear();
        self.topology_name = Some(topology.name.clone());
        info!(topology = %topology.name, links = self.links.len(), "topology created");
        Ok(())
    }

    fn start_simulation(&mut self) -> Result<(), NetworkError> {
        if self.topology_name.is_none() {
            return Err(NetworkError::NoTopology);
        }
        self.started = true;
        Ok(())
    }

    fn stop_simulation(&mut self) {
        self.started = false;
    }

    fn add_link_delay(&mut self, link: &str, delay_ms: f64) -> Result<(), NetworkError> {
        self.link_mut(link)?.delay_ms = delay_ms;
        debug!(link, delay_ms, "link delay set");
        Ok(())
    }

    fn add_link_loss(&mut self, link: &str, loss_pct: f64) -> Result<(), NetworkError> {
        self.link_mut(link)?.loss_pct = loss_pct;
        debug!(link, loss_pct, "link loss set");
        Ok(())
    }

    fn set_link_bandwidth(&mut self, link: &str, bandwidth_mbps: f64) -> Result<(), NetworkError> {
        self.link_mut(link)?.bandwidth_mbps = bandwidth_mbps;
        debug!(link, bandwidth_mbps, "link bandwidth set");
        Ok(())
    }

    fn add_client_node(&mut self, client: &ClientConfig) -> Result<(), NetworkError> {
        if self.topology_name.is_none() {
            return Err(NetworkError::NoTopology);
        }
        if self.clients.contains(&client.id) {
            return Err(NetworkError::DuplicateClient(client.id.clone()));
        }
        self.clients.push(client.id.clone());
        Ok(())
    }

    fn get_performance_metrics(&self) -> NetworkMetrics {
        let n = self.links.len();
        if n == 0 {
            return NetworkMetrics {
                client_nodes: self.clients.len(),
                ..Default::default()
            };
        }
        let count = n as f64;
        NetworkMetrics {
            avg_latency_ms: self.links.values().map(|l| l.delay_ms).sum::<f64>() / count,
            avg_loss_pct: self.links.values().map(|l| l.loss_pct).sum::<f64>() / count,
            avg_bandwidth_mbps: self.links.values().map(|l| l.bandwidth_mbps).sum::<f64>() / count,
            active_links: n,
            client_nodes: self.clients.len(),
        }
    }
}
