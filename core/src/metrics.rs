//! Metrics accumulated over a simulation run.
//!
//! The worker thread is the only producer: it appends one round's FL
//! metrics together with the network snapshot observed at that round
//! boundary. Consumers read clones through `get_simulation_status()`.

use serde::{Deserialize, Serialize};

/// Point-in-time network performance snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Mean one-way latency across active links (milliseconds)
    pub avg_latency_ms: f64,

    /// Mean packet loss across active links (percent)
    pub avg_loss_pct: f64,

    /// Mean link bandwidth (Mbit/s)
    pub avg_bandwidth_mbps: f64,

    /// Number of links in the topology
    pub active_links: usize,

    /// Number of client nodes attached to the topology
    pub client_nodes: usize,
}

/// Metrics for one completed training round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    /// Round number (starts at 1, strictly increasing)
    pub round: u32,

    /// Global model accuracy after aggregation
    pub accuracy: f64,

    /// Global model loss after aggregation
    pub loss: f64,

    /// Clients that contributed updates this round
    pub participating_clients: Vec<String>,

    /// Simulated wall-clock duration of the round (seconds)
    pub duration_seconds: f64,
}

/// Aggregated federated-learning metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlMetrics {
    /// Completed communication rounds
    pub communication_rounds: u32,

    /// Accuracy after the most recent round
    pub final_accuracy: f64,

    /// Loss after the most recent round
    pub final_loss: f64,

    /// Per-round history, in round order
    pub rounds: Vec<RoundMetrics>,
}

/// Full metrics document for a run: FL progression plus the network
/// conditions observed at each round boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub fl: FlMetrics,
    pub network: NetworkTrace,
}

/// Network snapshots taken at round boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkTrace {
    pub samples: Vec<NetworkMetrics>,
}

impl SimulationMetrics {
    /// Record one completed round with the network snapshot observed at its
    /// boundary.
    pub fn record_round(&mut self, round: RoundMetrics, network: NetworkMetrics) {
        self.fl.communication_rounds = round.round;
        self.fl.final_accuracy = round.accuracy;
        self.fl.final_loss = round.loss;
        self.fl.rounds.push(round);
        self.network.samples.push(network);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(n: u32, accuracy: f64) -> RoundMetrics {
        RoundMetrics {
            round: n,
            accuracy,
            loss: 1.0 - accuracy,
            participating_clients: vec!["client_1".to_string()],
            duration_seconds: 0.5,
        }
    }

    #[test]
    fn test_record_round_tracks_finals() {
        let mut metrics = SimulationMetrics::default();
        metrics.record_round(round(1, 0.5), NetworkMetrics::default());
        metrics.record_round(round(2, 0.6), NetworkMetrics::default());

        assert_eq!(metrics.fl.communication_rounds, 2);
        assert_eq!(metrics.fl.final_accuracy, 0.6);
        assert_eq!(metrics.fl.rounds.len(), 2);
        assert_eq!(metrics.network.samples.len(), 2);
    }

    #[test]
    fn test_serializes_with_fl_namespace() {
        let mut metrics = SimulationMetrics::default();
        metrics.record_round(round(1, 0.5), NetworkMetrics::default());

        let value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(value["fl"]["communication_rounds"], 1);
        assert!(value["network"]["samples"].is_array());
    }
}
