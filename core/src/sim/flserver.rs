// FL server collaborator
//
// The orchestrator executes training rounds only through this trait; the
// mock produces a deterministic convergence trajectory shaped by the
// network conditions it is handed at each round boundary.

use crate::metrics::{NetworkMetrics, RoundMetrics};
use crate::rng::RngManager;
use crate::scenario::{ClientConfig, ServerConfig};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by FL server implementations.
#[derive(Debug, Error, PartialEq)]
pub enum FlServerError {
    #[error("Server has not been configured")]
    NotConfigured,

    #[error("Training has not been started")]
    TrainingNotStarted,

    #[error("Round requires at least {min} clients, got {got}")]
    NotEnoughClients { min: usize, got: usize },
}

/// Interface between the orchestrator and the FL training backend.
pub trait FlServer: Send {
    /// Configure the server with its scenario settings and client roster.
    fn configure(
        &mut self,
        server: &ServerConfig,
        clients: &[ClientConfig],
    ) -> Result<(), FlServerError>;

    /// Begin a training session.
    fn start_training(&mut self) -> Result<(), FlServerError>;

    /// End the training session.
    fn stop_training(&mut self);

    /// Execute one training round with the given participants under the
    /// given network conditions.
    fn run_training_round(
        &mut self,
        participants: &[String],
        network: &NetworkMetrics,
    ) -> Result<RoundMetrics, FlServerError>;

    /// Metrics of the most recently completed round, if any.
    fn get_current_round_metrics(&self) -> Option<RoundMetrics>;
}

/// Accuracy the mock trajectory converges toward
const ACCURACY_CEILING: f64 = 0.95;

/// In-process FL server with a deterministic convergence model.
///
/// Accuracy climbs toward a ceiling with diminishing gains; packet loss and
/// latency dampen each round's gain, and the round duration grows with
/// latency and participant count. All jitter comes from the seeded RNG.
pub struct MockFlServer {
    config: Option<ServerConfig>,
    training: bool,
    round: u32,
    accuracy: f64,
    loss: f64,
    rng: RngManager,
    last_round: Option<RoundMetrics>,
}

impl Default for MockFlServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFlServer {
    pub fn new() -> Self {
        Self {
            config: None,
            training: false,
            round: 0,
            accuracy: 0.1,
            loss: 2.3,
            rng: RngManager::new(0),
            last_round: None,
        }
    }

    /// Whether a training session is active.
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl FlServer for MockFlServer {
    fn configure(
        &mut self,
        server: &ServerConfig,
        clients: &[ClientConfig],
    ) -> Result<(), FlServerError> {
        info!(
            strategy = %server.aggregation_strategy,
            clients = clients.len(),
            "fl server configured"
        );
        self.rng = RngManager::new(server.rng_seed);
        self.config = Some(server.clone());
        self.round = 0;
        self.accuracy = 0.1;
        self.loss = 2.3;
        self.last_round = None;
        Ok(())
    }

    fn start_training(&mut self) -> Result<(), FlServerError> {
        if self.config.is_none() {
            return Err(FlServerError::NotConfigured);
        }
        self.training = true;
        Ok(())
    }

    fn stop_training(&mut self) {
        self.training = false;
    }

    fn run_training_round(
        &mut self,
        participants: &[String],
        network: &NetworkMetrics,
    ) -> Result<RoundMetrics, FlServerError> {
        let min_clients = self
            .config
            .as_ref()
            .map(|c| c.min_clients)
            .ok_or(FlServerError::NotConfigured)?;
        if !self.training {
            return Err(FlServerError::TrainingNotStarted);
        }
        if participants.len() < min_clients {
            return Err(FlServerError::NotEnoughClients {
                min: min_clients,
                got: participants.len(),
            });
        }

        self.round += 1;

        // Diminishing gains toward the ceiling, dampened by network quality
        let loss_factor = (1.0 - network.avg_loss_pct / 100.0).max(0.0);
        let latency_factor = 1.0 / (1.0 + network.avg_latency_ms / 500.0);
        let gain = (ACCURACY_CEILING - self.accuracy)
            * 0.25
            * loss_factor
            * latency_factor
            * (1.0 + self.rng.jitter(0.1));
        self.accuracy = (self.accuracy + gain.max(0.0)).min(ACCURACY_CEILING);
        self.loss = (self.loss * (1.0 - 0.2 * loss_factor * latency_factor)).max(0.01);

        // Round time: per-client exchange over the current link conditions
        let duration_seconds = 0.05
            + participants.len() as f64 * 0.01
            + network.avg_latency_ms / 1000.0 * 2.0;

        let metrics = RoundMetrics {
            round: self.round,
            accuracy: self.accuracy,
            loss: self.loss,
            participating_clients: participants.to_vec(),
            duration_seconds,
        };
        debug!(
            round = self.round,
            accuracy = self.accuracy,
            loss = self.loss,
            "training round complete"
        );
        self.last_round = Some(metrics.clone());
        Ok(metrics)
    }

    fn get_current_round_metrics(&self) -> Option<RoundMetrics> {
        self.last_round.clone()
    }
}
