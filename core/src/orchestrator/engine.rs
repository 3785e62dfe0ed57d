//! Simulation orchestrator - round loop and scenario event scheduling
//!
//! Drives federated-learning training rounds against the NetworkSimulator
//! and FlServer collaborators while scenario-declared timed events mutate
//! link state mid-run.
//!
//! # Architecture
//!
//! One worker thread per active simulation runs a scheduler over a
//! monotonic min-heap that merges pending timed events with the round
//! advance tick:
//!
//! ```text
//! loop:
//! 1. Exit if the stop flag is cleared
//! 2. Fire every timed event whose offset has passed
//! 3. If paused, sleep briefly and re-poll (round advancement only;
//!    timed events keep firing)
//! 4. Exit if the round budget is exhausted
//! 5. When the round tick is due: snapshot network metrics, execute one
//!    training round, append metrics, advance the round counter
//! ```
//!
//! There are no per-event timer threads; all shared mutation goes through
//! the flags and the single state mutex, so the loop has no unsynchronized
//! writers. Pause is cooperative and boundary-only: an in-progress round
//! step is never interrupted.
//!
//! # Failure handling
//!
//! Control-plane contract throughout: public methods return bool or a
//! status snapshot, never an error. Collaborator failures are logged and
//! degrade the run; see the module-level taxonomy in the crate docs.

use crate::events::{CallbackRegistry, EventKind, EventLog, EventRecord};
use crate::metrics::SimulationMetrics;
use crate::orchestrator::results::{
    compute_scenario_hash, FinalState, ResultsDocument, ScenarioSummary,
};
use crate::policy::PolicyEngine;
use crate::scenario::{Scenario, ScenarioEvent, TimedEvent};
use crate::sim::{FlServer, NetworkSimulator};
use serde::Serialize;
use serde_json::json;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default bounded join timeout for `stop_simulation`
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler poll granularity (pause gate, stop responsiveness)
const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// Status types
// ============================================================================

/// Round progress within the loaded scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub rounds_completed: u32,
    pub max_rounds: u32,
    pub percentage: f64,
}

/// Snapshot returned by `get_simulation_status`.
///
/// `status` is one of `"running"`, `"paused"`, `"stopped"`; all terminal
/// and not-yet-started states report `"stopped"`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatus {
    pub status: String,
    pub paused: bool,
    pub progress: Progress,
    pub elapsed_seconds: f64,
    pub metrics: SimulationMetrics,
    pub events_count: usize,
}

// ============================================================================
// Shared run state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotLoaded,
    Loaded,
    Running,
    Completed,
    Stopped,
}

struct RunState {
    lifecycle: Lifecycle,
    rounds_completed: u32,
    max_rounds: u32,
    metrics: SimulationMetrics,
    events: EventLog,
    active_clients: Vec<String>,
    started_at: Option<Instant>,
    elapsed_seconds: f64,
}

impl RunState {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::NotLoaded,
            rounds_completed: 0,
            max_rounds: 0,
            metrics: SimulationMetrics::default(),
            events: EventLog::new(),
            active_clients: Vec::new(),
            started_at: None,
            elapsed_seconds: 0.0,
        }
    }
}

struct Shared {
    running: AtomicBool,
    paused: AtomicBool,
    state: Mutex<RunState>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Round-based simulation orchestrator.
///
/// Owns the loaded scenario, the collaborator handles, the policy engine,
/// and the callback registry. Lifecycle:
/// `NotLoaded -> Loaded -> Running -> {Paused <-> Running} -> Completed | Stopped`.
pub struct SimulationOrchestrator {
    scenario: Option<Arc<Scenario>>,
    scenario_policies: Vec<String>,
    network: Arc<Mutex<dyn NetworkSimulator>>,
    fl_server: Arc<Mutex<dyn FlServer>>,
    policy_engine: Arc<Mutex<PolicyEngine>>,
    callbacks: CallbackRegistry,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl SimulationOrchestrator {
    /// Create an orchestrator around its collaborators.
    pub fn new(
        network: impl NetworkSimulator + 'static,
        fl_server: impl FlServer + 'static,
        policy_engine: PolicyEngine,
    ) -> Self {
        Self {
            scenario: None,
            scenario_policies: Vec::new(),
            network: Arc::new(Mutex::new(network)),
            fl_server: Arc::new(Mutex::new(fl_server)),
            policy_engine: Arc::new(Mutex::new(policy_engine)),
            callbacks: CallbackRegistry::new(),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                state: Mutex::new(RunState::new()),
            }),
            worker: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    /// Override the bounded join timeout used by `stop_simulation`.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Handle to the policy engine (shared with the orchestrator).
    pub fn policy_engine(&self) -> Arc<Mutex<PolicyEngine>> {
        self.policy_engine.clone()
    }

    /// Subscribe to simulation lifecycle events.
    pub fn register_callback(
        &self,
        kind: EventKind,
        callback: impl Fn(&crate::events::SimEvent) + Send + Sync + 'static,
    ) {
        self.callbacks.register(kind, callback);
    }

    // ========================================================================
    // Scenario loading
    // ========================================================================

    /// Validate a scenario and configure the collaborators for it.
    ///
    /// Registers scenario-declared policies with the engine and selects the
    /// scenario's aggregation strategy. Any failure aborts the load with a
    /// `false` return; policies registered by this load attempt are
    /// unregistered again so the engine is not left half-configured.
    pub fn load_scenario(&mut self, scenario: Scenario) -> bool {
        if self.shared.running.load(Ordering::SeqCst) {
            warn!("cannot load scenario while a simulation is running");
            return false;
        }
        if let Err(e) = scenario.validate() {
            warn!(scenario = %scenario.name, error = %e, "scenario validation failed");
            return false;
        }

        {
            let mut network = lock(&self.network);
            if let Err(e) = network.create_topology(&scenario.topology) {
                warn!(error = %e, "topology configuration failed");
                return false;
            }
            for client in &scenario.clients {
                if let Err(e) = network.add_client_node(client) {
                    warn!(client = %client.id, error = %e, "client node configuration failed");
                    return false;
                }
            }
        }

        if let Err(e) = lock(&self.fl_server).configure(&scenario.server, &scenario.clients) {
            warn!(error = %e, "fl server configuration failed");
            return false;
        }

        {
            let mut engine = lock(&self.policy_engine);
            // Policies from a previously loaded scenario are replaced
            for name in self.scenario_policies.drain(..) {
                engine.unregister_policy(&name);
            }

            let mut registered = Vec::new();
            for policy in &scenario.policies {
                if engine.register_policy(&policy.name, policy.spec.clone()) {
                    registered.push(policy.name.clone());
                } else {
                    warn!(policy = %policy.name, "scenario policy registration failed; aborting load");
                    for name in registered {
                        engine.unregister_policy(&name);
                    }
                    return false;
                }
            }

            if !engine.set_strategy(&scenario.server.aggregation_strategy) {
                warn!(
                    strategy = %scenario.server.aggregation_strategy,
                    "unknown aggregation strategy; aborting load"
                );
                for name in registered {
                    engine.unregister_policy(&name);
                }
                return false;
            }
            self.scenario_policies = registered;
        }

        {
            let mut state = lock(&self.shared.state);
            state.lifecycle = Lifecycle::Loaded;
            state.rounds_completed = 0;
            state.max_rounds = scenario.max_rounds;
            state.metrics = SimulationMetrics::default();
            state.events.clear();
            state.active_clients = scenario.clients.iter().map(|c| c.id.clone()).collect();
            state.started_at = None;
            state.elapsed_seconds = 0.0;
        }

        info!(
            scenario = %scenario.name,
            clients = scenario.clients.len(),
            events = scenario.events.len(),
            max_rounds = scenario.max_rounds,
            "scenario loaded"
        );
        self.scenario = Some(Arc::new(scenario));
        true
    }

    // ========================================================================
    // Run control
    // ========================================================================

    /// Start the round loop in one worker thread.
    ///
    /// Rejected when no scenario is loaded or a simulation is already
    /// running. A completed or stopped run can be started again with the
    /// loaded scenario.
    pub fn start_simulation(&mut self) -> bool {
        let Some(scenario) = self.scenario.clone() else {
            warn!("cannot start: no scenario loaded");
            return false;
        };
        if self.shared.running.load(Ordering::SeqCst) {
            warn!("cannot start: simulation already running");
            return false;
        }
        // Guards against a worker detached by a timed-out stop join: the
        // lifecycle only leaves Running when the worker actually exits
        if lock(&self.shared.state).lifecycle == Lifecycle::Running {
            warn!("cannot start: previous worker thread has not exited");
            return false;
        }
        if let Some(handle) = self.worker.take() {
            // Previous run is over; reap its thread
            if handle.join().is_err() {
                error!("previous worker thread panicked");
            }
        }

        if let Err(e) = lock(&self.network).start_simulation() {
            warn!(error = %e, "network simulator failed to start");
            return false;
        }
        if let Err(e) = lock(&self.fl_server).start_training() {
            warn!(error = %e, "fl server failed to start training");
            lock(&self.network).stop_simulation();
            return false;
        }

        {
            let mut state = lock(&self.shared.state);
            state.lifecycle = Lifecycle::Running;
            state.rounds_completed = 0;
            state.max_rounds = scenario.max_rounds;
            state.metrics = SimulationMetrics::default();
            state.events.clear();
            state.active_clients = scenario.clients.iter().map(|c| c.id.clone()).collect();
            state.started_at = Some(Instant::now());
            state.elapsed_seconds = 0.0;
        }
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let worker = WorkerContext {
            scenario: scenario.clone(),
            shared: self.shared.clone(),
            network: self.network.clone(),
            fl_server: self.fl_server.clone(),
            callbacks: self.callbacks.clone(),
        };
        let spawned = thread::Builder::new()
            .name("sim-worker".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!(scenario = %scenario.name, "simulation started");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to spawn worker thread");
                self.shared.running.store(false, Ordering::SeqCst);
                lock(&self.fl_server).stop_training();
                lock(&self.network).stop_simulation();
                let mut state = lock(&self.shared.state);
                state.lifecycle = Lifecycle::Loaded;
                state.started_at = None;
                false
            }
        }
    }

    /// Gate round advancement at the next loop boundary.
    ///
    /// Returns false when no simulation is running. Pausing while already
    /// paused is a no-op returning true; the pause event fires once per
    /// genuine transition. Timed events keep firing while paused.
    pub fn pause_simulation(&self) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            warn!("cannot pause: no simulation running");
            return false;
        }
        if self.shared.paused.swap(true, Ordering::SeqCst) {
            return true;
        }
        info!("simulation paused");
        self.callbacks.emit(EventKind::SimulationPaused, json!({}));
        true
    }

    /// Re-open the round advancement gate.
    ///
    /// Returns false when no simulation is running. Resuming while not
    /// paused is a no-op returning true and does not re-fire the resume
    /// event.
    pub fn resume_simulation(&self) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            warn!("cannot resume: no simulation running");
            return false;
        }
        if !self.shared.paused.swap(false, Ordering::SeqCst) {
            return true;
        }
        info!("simulation resumed");
        self.callbacks.emit(EventKind::SimulationResumed, json!({}));
        true
    }

    /// Stop the run and join the worker thread, best effort.
    ///
    /// The join is bounded (default 5s): if the worker has not exited by
    /// then, a warning is logged and the call returns anyway with the
    /// thread detached. The return value reports whether there was a run
    /// to stop, not whether the thread has exited.
    pub fn stop_simulation(&mut self) -> bool {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        if !was_running && self.worker.is_none() {
            warn!("no simulation to stop");
            return false;
        }
        self.shared.paused.store(false, Ordering::SeqCst);
        lock(&self.network).stop_simulation();

        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + self.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("worker thread panicked");
                }
            } else {
                warn!(
                    timeout_seconds = self.join_timeout.as_secs_f64(),
                    "worker thread did not exit within the join timeout; detaching"
                );
            }
        }

        if was_running {
            info!("simulation stopped");
            self.callbacks.emit(EventKind::SimulationStopped, json!({}));
        }
        true
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Current status snapshot.
    pub fn get_simulation_status(&self) -> SimulationStatus {
        let running = self.shared.running.load(Ordering::SeqCst);
        let paused = self.shared.paused.load(Ordering::SeqCst);
        let state = lock(&self.shared.state);

        let percentage = if state.max_rounds == 0 {
            0.0
        } else {
            f64::from(state.rounds_completed) / f64::from(state.max_rounds) * 100.0
        };
        let elapsed_seconds = match (running, state.started_at) {
            (true, Some(started)) => started.elapsed().as_secs_f64(),
            _ => state.elapsed_seconds,
        };
        let status = if running && paused {
            "paused"
        } else if running {
            "running"
        } else {
            "stopped"
        };

        SimulationStatus {
            status: status.to_string(),
            paused,
            progress: Progress {
                rounds_completed: state.rounds_completed,
                max_rounds: state.max_rounds,
                percentage,
            },
            elapsed_seconds,
            metrics: state.metrics.clone(),
            events_count: state.events.len(),
        }
    }

    /// The scenario events that have fired so far, in firing order.
    pub fn recorded_events(&self) -> Vec<EventRecord> {
        lock(&self.shared.state).events.records().to_vec()
    }
}

impl Drop for SimulationOrchestrator {
    fn drop(&mut self) {
        if self.shared.running.load(Ordering::SeqCst) || self.worker.is_some() {
            self.stop_simulation();
        }
    }
}

// ============================================================================
// Worker thread
// ============================================================================

struct WorkerContext {
    scenario: Arc<Scenario>,
    shared: Arc<Shared>,
    network: Arc<Mutex<dyn NetworkSimulator>>,
    fl_server: Arc<Mutex<dyn FlServer>>,
    callbacks: CallbackRegistry,
}

impl WorkerContext {
    fn run(self) {
        let started = Instant::now();
        let interval = Duration::from_secs_f64(self.scenario.round_interval_seconds.max(0.0));

        // Pending timed events keyed by offset, earliest first
        let mut pending: BinaryHeap<Reverse<(Duration, usize)>> = self
            .scenario
            .events
            .iter()
            .enumerate()
            .map(|(index, timed)| {
                Reverse((
                    Duration::from_secs_f64(timed.trigger_time_seconds.max(0.0)),
                    index,
                ))
            })
            .collect();

        let mut next_round_at = started;
        let completed = loop {
            if !self.shared.running.load(Ordering::SeqCst) {
                break false;
            }

            let now = Instant::now();
            while let Some(&Reverse((due, index))) = pending.peek() {
                if started + due > now {
                    break;
                }
                pending.pop();
                self.fire_timed_event(&self.scenario.events[index], started);
            }

            if self.shared.paused.load(Ordering::SeqCst) {
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            let rounds_completed = lock(&self.shared.state).rounds_completed;
            if rounds_completed >= self.scenario.max_rounds {
                break true;
            }

            let now = Instant::now();
            if now < next_round_at {
                let mut wake = next_round_at;
                if let Some(&Reverse((due, _))) = pending.peek() {
                    wake = wake.min(started + due);
                }
                // Cap the sleep so stop/pause stay responsive
                let sleep_for = wake.saturating_duration_since(now).min(POLL_INTERVAL);
                if !sleep_for.is_zero() {
                    thread::sleep(sleep_for);
                }
                continue;
            }

            if !self.execute_round(rounds_completed + 1, started) {
                break false;
            }
            next_round_at = Instant::now() + interval;
        };

        self.finish(completed, started);
    }

    /// Run one training round. Returns false when the run must end.
    fn execute_round(&self, round: u32, started: Instant) -> bool {
        self.callbacks
            .emit(EventKind::RoundStarted, json!({"round": round}));

        let network_metrics = lock(&self.network).get_performance_metrics();
        let participants = lock(&self.shared.state).active_clients.clone();
        let outcome = lock(&self.fl_server).run_training_round(&participants, &network_metrics);

        match outcome {
            Ok(round_metrics) => {
                {
                    let mut state = lock(&self.shared.state);
                    state.metrics.record_round(round_metrics.clone(), network_metrics);
                    state.rounds_completed = round;
                    state.elapsed_seconds = started.elapsed().as_secs_f64();
                }
                self.callbacks.emit(
                    EventKind::RoundCompleted,
                    json!({
                        "round": round,
                        "accuracy": round_metrics.accuracy,
                        "loss": round_metrics.loss,
                        "participants": round_metrics.participating_clients.len(),
                    }),
                );
                true
            }
            Err(e) => {
                error!(round, error = %e, "training round failed; ending run");
                false
            }
        }
    }

    /// Apply one timed event, record it, and announce it.
    fn fire_timed_event(&self, timed: &TimedEvent, started: Instant) {
        let fired_at_seconds = started.elapsed().as_secs_f64();

        match &timed.event {
            ScenarioEvent::LinkCongestion {
                link,
                delay_ms,
                loss_pct,
                bandwidth_mbps,
            } => {
                let mut network = lock(&self.network);
                if let Err(e) = network.add_link_delay(link, *delay_ms) {
                    warn!(link = %link, error = %e, "link delay event failed");
                }
                if let Err(e) = network.add_link_loss(link, *loss_pct) {
                    warn!(link = %link, error = %e, "link loss event failed");
                }
                if let Some(bandwidth) = bandwidth_mbps {
                    if let Err(e) = network.set_link_bandwidth(link, *bandwidth) {
                        warn!(link = %link, error = %e, "link bandwidth event failed");
                    }
                }
            }
            ScenarioEvent::LinkDelay { link, delay_ms } => {
                if let Err(e) = lock(&self.network).add_link_delay(link, *delay_ms) {
                    warn!(link = %link, error = %e, "link delay event failed");
                }
            }
            ScenarioEvent::LinkLoss { link, loss_pct } => {
                if let Err(e) = lock(&self.network).add_link_loss(link, *loss_pct) {
                    warn!(link = %link, error = %e, "link loss event failed");
                }
            }
            ScenarioEvent::LinkBandwidth {
                link,
                bandwidth_mbps,
            } => {
                if let Err(e) = lock(&self.network).set_link_bandwidth(link, *bandwidth_mbps) {
                    warn!(link = %link, error = %e, "link bandwidth event failed");
                }
            }
            ScenarioEvent::ClientDropout { client } => {
                let mut state = lock(&self.shared.state);
                state.active_clients.retain(|c| c != client);
                info!(client = %client, remaining = state.active_clients.len(), "client dropped out");
            }
        }

        let record = EventRecord {
            event_type: timed.event.event_type().to_string(),
            trigger_time_seconds: timed.trigger_time_seconds,
            fired_at_seconds,
            details: timed.event.details(),
        };
        lock(&self.shared.state).events.log(record.clone());
        self.callbacks.emit(
            EventKind::SimulationEvent,
            json!({
                "type": record.event_type,
                "trigger_time_seconds": record.trigger_time_seconds,
                "fired_at_seconds": record.fired_at_seconds,
                "details": record.details,
            }),
        );
    }

    /// Loop exit: seal state, stop collaborators, persist, announce.
    fn finish(&self, completed: bool, started: Instant) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        lock(&self.fl_server).stop_training();
        lock(&self.network).stop_simulation();

        let scenario_hash = match compute_scenario_hash(self.scenario.as_ref()) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "scenario hash computation failed");
                String::new()
            }
        };

        let document = {
            let mut state = lock(&self.shared.state);
            state.lifecycle = if completed {
                Lifecycle::Completed
            } else {
                Lifecycle::Stopped
            };
            state.elapsed_seconds = started.elapsed().as_secs_f64();

            ResultsDocument {
                scenario: ScenarioSummary {
                    name: self.scenario.name.clone(),
                    description: self.scenario.description.clone(),
                },
                timestamp: chrono::Utc::now(),
                duration_seconds: state.elapsed_seconds,
                metrics: state.metrics.clone(),
                events: state.events.records().to_vec(),
                final_state: FinalState {
                    status: "stopped".to_string(),
                    rounds_completed: state.rounds_completed,
                    max_rounds: state.max_rounds,
                    scenario_hash,
                },
            }
        };

        if let Some(path) = &self.scenario.output_path {
            match document.write(path) {
                Ok(()) => info!(path = %path.display(), "results persisted"),
                Err(e) => warn!(path = %path.display(), error = %e, "results persistence failed"),
            }
        }

        info!(
            completed,
            rounds = document.final_state.rounds_completed,
            duration_seconds = document.duration_seconds,
            "simulation finished"
        );
        self.callbacks.emit(
            EventKind::SimulationCompleted,
            json!({
                "completed": completed,
                "rounds_completed": document.final_state.rounds_completed,
                "duration_seconds": document.duration_seconds,
            }),
        );
    }
}
