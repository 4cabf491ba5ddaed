//! Whole runs against the simulated gateway, on paused tokio time.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use omnibus_loadgen::api::paths;
use omnibus_loadgen::{
    LoadScheduler, Role, RunConfig, SessionProfile, SimFaults, SimGateway, stop_signal,
};

fn config(users: u64, run_time: Option<Duration>, seed: u64) -> RunConfig {
    RunConfig {
        users,
        spawn_rate: 2.0,
        run_time,
        seed,
        ..RunConfig::default()
    }
}

fn registered_users(gateway: &SimGateway) -> BTreeSet<String> {
    gateway
        .requests()
        .into_iter()
        .filter(|r| r.path == paths::REGISTER)
        .filter_map(|r| r.body)
        .filter_map(|b| b["username"].as_str().map(str::to_string))
        .filter(|u| ["load_", "idem_", "burst_"].iter().any(|p| u.starts_with(p)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn mixed_run_against_correct_gateway_passes() {
    let gateway = Arc::new(SimGateway::new());
    let scheduler =
        LoadScheduler::new(Arc::clone(&gateway), config(9, Some(Duration::from_secs(30)), 42))
            .unwrap();
    let (_handle, stop) = stop_signal();

    let report = scheduler.run(stop).await;

    assert!(report.passed());
    assert_eq!(report.users_spawned, 9);
    assert!(report.stats.total_requests() > 0);
    let started: u64 = Role::ALL
        .iter()
        .map(|role| report.stats.sessions(*role).started)
        .sum();
    assert_eq!(started, 9);
    assert_eq!(registered_users(&gateway).len(), 9);
    assert!(report.elapsed >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn broken_idempotency_fails_the_run() {
    let gateway = Arc::new(SimGateway::with_faults(SimFaults {
        broken_idempotency: true,
        ..SimFaults::default()
    }));
    let run = RunConfig {
        profiles: vec![Arc::new(SessionProfile::idempotency())],
        ..config(2, Some(Duration::from_secs(20)), 7)
    };
    let scheduler = LoadScheduler::new(gateway, run).unwrap();
    let (_handle, stop) = stop_signal();

    let report = scheduler.run(stop).await;

    assert!(!report.passed());
    assert!(report.stats.violations().iter().all(|v| v.created > 1));
    let summary = serde_json::to_value(report.summary()).unwrap();
    assert_eq!(summary["passed"], false);
}

#[tokio::test(start_paused = true)]
async fn run_time_cuts_spawning_short() {
    let gateway = Arc::new(SimGateway::new());
    // 100 users at 2/s would take 50s to spawn.
    let scheduler =
        LoadScheduler::new(gateway, config(100, Some(Duration::from_secs(5)), 1)).unwrap();
    let (_handle, stop) = stop_signal();

    let report = scheduler.run(stop).await;

    assert!(report.users_spawned >= 10 && report.users_spawned <= 11);
}

#[tokio::test(start_paused = true)]
async fn external_stop_ends_an_unbounded_run() {
    let gateway = Arc::new(SimGateway::new());
    let scheduler = LoadScheduler::new(gateway, config(4, None, 5)).unwrap();
    let (handle, stop) = stop_signal();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        handle.stop();
    });
    let report = scheduler.run(stop).await;

    assert_eq!(report.users_spawned, 4);
    assert!(report.elapsed >= Duration::from_secs(15));
    assert!(report.passed());
}

#[tokio::test(start_paused = true)]
async fn same_seed_spawns_same_users() {
    let first = Arc::new(SimGateway::new());
    let second = Arc::new(SimGateway::new());
    for gateway in [&first, &second] {
        let scheduler =
            LoadScheduler::new(Arc::clone(gateway), config(6, Some(Duration::from_secs(10)), 77))
                .unwrap();
        let (_handle, stop) = stop_signal();
        scheduler.run(stop).await;
    }

    assert_eq!(registered_users(&first), registered_users(&second));
    assert_eq!(registered_users(&first).len(), 6);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let gateway = Arc::new(SimGateway::new());
    let result = LoadScheduler::new(gateway, RunConfig {
        spawn_rate: 0.0,
        ..RunConfig::default()
    });
    assert!(result.is_err());
}
