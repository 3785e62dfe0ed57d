//! Full orchestrator integration: round budget, pause/resume laws, timed
//! events, lifecycle callbacks, and results persistence.

use fl_simulator_core_rs::policy::{PolicyEngine, PolicyRegistry};
use fl_simulator_core_rs::scenario::{
    ClientConfig, LinkConfig, Scenario, ScenarioEvent, ScenarioPolicy, TimedEvent, TopologyConfig,
};
use fl_simulator_core_rs::sim::{MockFlServer, MockNetworkSimulator};
use fl_simulator_core_rs::{EventKind, PolicySpec, ResultsDocument, SimulationOrchestrator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn scenario(max_rounds: u32, round_interval_seconds: f64) -> Scenario {
    Scenario {
        name: "integration".to_string(),
        description: "end to end run".to_string(),
        topology: TopologyConfig {
            name: "star".to_string(),
            links: vec![LinkConfig {
                id: "wan_1".to_string(),
                delay_ms: 10.0,
                loss_pct: 0.0,
                bandwidth_mbps: 100.0,
            }],
        },
        server: Default::default(),
        clients: vec![ClientConfig {
            id: "client_1".to_string(),
            link: Some("wan_1".to_string()),
            dataset_size: 1000,
            battery_level: 100.0,
        }],
        events: vec![],
        policies: vec![],
        max_rounds,
        round_interval_seconds,
        output_path: None,
    }
}

fn orchestrator() -> SimulationOrchestrator {
    // RUST_LOG=debug surfaces the worker's round and event logging
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    SimulationOrchestrator::new(
        MockNetworkSimulator::new(),
        MockFlServer::new(),
        PolicyEngine::new(PolicyRegistry::new()),
    )
}

fn wait_until_stopped(orchestrator: &SimulationOrchestrator) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if orchestrator.get_simulation_status().status == "stopped" {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("simulation did not stop in time");
}

/// The canonical end-to-end scenario: three rounds, one client, one
/// link_congestion event at 1s.
#[test]
fn end_to_end_three_rounds_with_congestion_event() {
    let mut run = scenario(3, 0.5);
    run.events = vec![TimedEvent {
        trigger_time_seconds: 1.0,
        event: ScenarioEvent::LinkCongestion {
            link: "wan_1".to_string(),
            delay_ms: 250.0,
            loss_pct: 10.0,
            bandwidth_mbps: None,
        },
    }];

    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(run));
    assert!(orchestrator.start_simulation());
    wait_until_stopped(&orchestrator);

    let status = orchestrator.get_simulation_status();
    assert_eq!(status.status, "stopped");
    assert_eq!(status.metrics.fl.communication_rounds, 3);
    assert_eq!(status.progress.rounds_completed, 3);
    assert_eq!(status.progress.max_rounds, 3);
    assert_eq!(status.progress.percentage, 100.0);

    let events = orchestrator.recorded_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "link_congestion");
    assert!(events[0].fired_at_seconds >= 1.0);
}

#[test]
fn status_progress_reaches_100_exactly_at_budget() {
    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(scenario(5, 0.0)));
    assert!(orchestrator.start_simulation());
    wait_until_stopped(&orchestrator);

    let status = orchestrator.get_simulation_status();
    assert_eq!(status.progress.rounds_completed, 5);
    assert_eq!(status.progress.percentage, 100.0);
    // Round numbers strictly increase from 1
    let rounds: Vec<u32> = status.metrics.fl.rounds.iter().map(|r| r.round).collect();
    assert_eq!(rounds, vec![1, 2, 3, 4, 5]);
}

#[test]
fn pause_gates_rounds_and_resume_reopens() {
    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(scenario(100, 0.05)));
    assert!(orchestrator.start_simulation());

    assert!(orchestrator.pause_simulation());
    // Let any in-flight round drain; pause is boundary-only
    thread::sleep(Duration::from_millis(400));
    let at_pause = orchestrator.get_simulation_status();
    assert_eq!(at_pause.status, "paused");
    assert!(at_pause.paused);

    thread::sleep(Duration::from_millis(600));
    let still_paused = orchestrator.get_simulation_status();
    assert_eq!(
        at_pause.progress.rounds_completed,
        still_paused.progress.rounds_completed,
        "rounds advanced while paused"
    );

    assert!(orchestrator.resume_simulation());
    thread::sleep(Duration::from_millis(600));
    let after_resume = orchestrator.get_simulation_status();
    assert!(
        after_resume.progress.rounds_completed > still_paused.progress.rounds_completed,
        "rounds did not advance after resume"
    );

    assert!(orchestrator.stop_simulation());
}

#[test]
fn pause_resume_edge_cases_and_event_counts() {
    let mut orchestrator = orchestrator();

    // While stopped: pause refused, state unchanged
    assert!(!orchestrator.pause_simulation());
    assert!(!orchestrator.resume_simulation());

    assert!(orchestrator.load_scenario(scenario(100, 0.05)));
    assert!(orchestrator.start_simulation());

    let paused_events = Arc::new(AtomicUsize::new(0));
    let resumed_events = Arc::new(AtomicUsize::new(0));
    {
        let paused_events = paused_events.clone();
        orchestrator.register_callback(EventKind::SimulationPaused, move |_| {
            paused_events.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let resumed_events = resumed_events.clone();
        orchestrator.register_callback(EventKind::SimulationResumed, move |_| {
            resumed_events.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Resume while running-but-not-paused: no-op true, no event
    assert!(orchestrator.resume_simulation());
    assert_eq!(resumed_events.load(Ordering::SeqCst), 0);

    // Pause twice: one transition, one event
    assert!(orchestrator.pause_simulation());
    assert!(orchestrator.pause_simulation());
    assert_eq!(paused_events.load(Ordering::SeqCst), 1);

    // Resume twice: one transition, one event
    assert!(orchestrator.resume_simulation());
    assert!(orchestrator.resume_simulation());
    assert_eq!(resumed_events.load(Ordering::SeqCst), 1);

    assert!(orchestrator.stop_simulation());
}

#[test]
fn timed_events_fire_while_paused() {
    let mut run = scenario(100, 0.05);
    run.events = vec![TimedEvent {
        trigger_time_seconds: 0.5,
        event: ScenarioEvent::LinkDelay {
            link: "wan_1".to_string(),
            delay_ms: 400.0,
        },
    }];

    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(run));
    assert!(orchestrator.start_simulation());
    assert!(orchestrator.pause_simulation());

    // The event offset passes while the round loop is gated
    let deadline = Instant::now() + Duration::from_secs(5);
    while orchestrator.recorded_events().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let events = orchestrator.recorded_events();
    assert_eq!(events.len(), 1, "timed event did not fire during pause");
    assert_eq!(events[0].event_type, "link_delay");
    assert_eq!(orchestrator.get_simulation_status().status, "paused");

    assert!(orchestrator.stop_simulation());
}

#[test]
fn stop_midway_seals_run_and_fires_events_once() {
    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(scenario(1000, 0.05)));

    let stopped_events = Arc::new(AtomicUsize::new(0));
    let completed_events = Arc::new(AtomicUsize::new(0));
    {
        let stopped_events = stopped_events.clone();
        orchestrator.register_callback(EventKind::SimulationStopped, move |_| {
            stopped_events.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let completed_events = completed_events.clone();
        orchestrator.register_callback(EventKind::SimulationCompleted, move |_| {
            completed_events.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(orchestrator.start_simulation());
    thread::sleep(Duration::from_millis(300));
    assert!(orchestrator.stop_simulation());

    let status = orchestrator.get_simulation_status();
    assert_eq!(status.status, "stopped");
    assert!(status.progress.rounds_completed < 1000);
    assert_eq!(stopped_events.load(Ordering::SeqCst), 1);
    // Loop exit persists and announces completion regardless of cause
    assert_eq!(completed_events.load(Ordering::SeqCst), 1);

    // Stopping again: nothing left to stop
    assert!(!orchestrator.stop_simulation());
}

#[test]
fn round_callbacks_carry_round_numbers() {
    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(scenario(3, 0.0)));

    let started_rounds: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let completed_rounds: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let started_rounds = started_rounds.clone();
        orchestrator.register_callback(EventKind::RoundStarted, move |event| {
            if let Some(round) = event.payload["round"].as_u64() {
                started_rounds.lock().unwrap().push(round);
            }
        });
    }
    {
        let completed_rounds = completed_rounds.clone();
        orchestrator.register_callback(EventKind::RoundCompleted, move |event| {
            if let Some(round) = event.payload["round"].as_u64() {
                completed_rounds.lock().unwrap().push(round);
            }
        });
    }

    assert!(orchestrator.start_simulation());
    wait_until_stopped(&orchestrator);

    assert_eq!(*started_rounds.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(*completed_rounds.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn results_document_is_persisted_on_completion() {
    let dir = std::env::temp_dir().join("fl_sim_integration_results");
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("results.json");

    let mut run = scenario(3, 0.2);
    run.output_path = Some(path.clone());
    run.events = vec![TimedEvent {
        trigger_time_seconds: 0.3,
        event: ScenarioEvent::LinkLoss {
            link: "wan_1".to_string(),
            loss_pct: 5.0,
        },
    }];

    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(run));
    assert!(orchestrator.start_simulation());
    wait_until_stopped(&orchestrator);

    let raw = std::fs::read_to_string(&path).expect("results document missing");
    let document: ResultsDocument = serde_json::from_str(&raw).unwrap();

    assert_eq!(document.scenario.name, "integration");
    assert_eq!(document.final_state.status, "stopped");
    assert_eq!(document.final_state.rounds_completed, 3);
    assert_eq!(document.final_state.max_rounds, 3);
    assert!(!document.final_state.scenario_hash.is_empty());
    assert_eq!(document.metrics.fl.communication_rounds, 3);
    assert_eq!(document.events.len(), 1);
    assert!(document.duration_seconds > 0.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scenario_policies_register_at_load_time() {
    let mut run = scenario(1, 0.0);
    run.policies = vec![ScenarioPolicy {
        name: "resource".to_string(),
        spec: PolicySpec {
            kind: Some("resource".to_string()),
            ..Default::default()
        },
    }];

    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(run));

    let engine = orchestrator.policy_engine();
    let mut engine = engine.lock().unwrap();
    engine.start();
    let status = engine.get_status();
    assert_eq!(status.policies, vec!["resource".to_string()]);

    let mut ctx = fl_simulator_core_rs::policy::rules::Context::new();
    ctx.insert("battery_level", 10);
    assert!(!engine.evaluate_policy("resource", &ctx).allowed);
}

#[test]
fn load_rejects_unknown_strategy_without_leaking_policies() {
    let mut run = scenario(1, 0.0);
    run.server.aggregation_strategy = "quantum_avg".to_string();
    run.policies = vec![ScenarioPolicy {
        name: "resource".to_string(),
        spec: PolicySpec {
            kind: Some("resource".to_string()),
            ..Default::default()
        },
    }];

    let mut orchestrator = orchestrator();
    assert!(!orchestrator.load_scenario(run));

    // The aborted load unregistered its policies again
    let engine = orchestrator.policy_engine();
    let engine = engine.lock().unwrap();
    assert_eq!(engine.get_status().policy_count, 0);
}

#[test]
fn reloading_replaces_scenario_policies() {
    let mut first = scenario(1, 0.0);
    first.policies = vec![ScenarioPolicy {
        name: "resource".to_string(),
        spec: PolicySpec {
            kind: Some("resource".to_string()),
            ..Default::default()
        },
    }];

    let mut second = scenario(1, 0.0);
    second.policies = vec![ScenarioPolicy {
        name: "qos".to_string(),
        spec: PolicySpec {
            kind: Some("network_qos".to_string()),
            ..Default::default()
        },
    }];

    let mut orchestrator = orchestrator();
    assert!(orchestrator.load_scenario(first));
    assert!(orchestrator.load_scenario(second));

    let engine = orchestrator.policy_engine();
    let engine = engine.lock().unwrap();
    assert_eq!(engine.get_status().policies, vec!["qos".to_string()]);
}
