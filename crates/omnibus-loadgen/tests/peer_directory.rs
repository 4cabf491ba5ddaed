//! Peer pool growth, reuse bias and provisioning fallbacks.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::event_log;
use omnibus_loadgen::api::{names, paths};
use omnibus_loadgen::{
    AccountDirectory, IdentityTemplate, LoadRng, PeerChoice, SessionClient, SessionProfile,
    SimFaults, SimGateway, SkipReason, TaskKind, TaskOutcome, VirtualUserSession,
};
use proptest::prelude::*;

fn payment_session(gateway: &Arc<SimGateway>, seed: u64) -> VirtualUserSession<SimGateway> {
    let (_log, sink) = event_log();
    VirtualUserSession::new(
        seed,
        Arc::new(SessionProfile::payment()),
        Arc::clone(gateway),
        sink,
        LoadRng::new(seed),
    )
}

#[tokio::test]
async fn pool_only_grows_and_never_repeats() {
    let gateway = Arc::new(SimGateway::new());
    let mut session = payment_session(&gateway, 30);
    session.start().await;

    let mut previous = 0;
    for _ in 0..150 {
        session.run_task(TaskKind::Transfer).await;
        let peers = session.directory().peers();
        assert!(peers.len() >= previous);
        let unique: HashSet<&String> = peers.iter().collect();
        assert_eq!(unique.len(), peers.len());
        previous = peers.len();
    }

    // 20% of transfers provision once the pool is non-empty
    assert!(previous > 10 && previous < 60, "pool size {previous}");
    let own = session.account_id();
    assert!(session.directory().peers().iter().all(|p| Some(p.as_str()) != own));
}

#[tokio::test]
async fn first_transfer_always_provisions() {
    let gateway = Arc::new(SimGateway::new());
    let (log, sink) = event_log();
    let mut session = VirtualUserSession::new(
        1,
        Arc::new(SessionProfile::payment()),
        Arc::clone(&gateway),
        sink,
        LoadRng::new(31),
    );
    session.start().await;

    assert_eq!(session.run_task(TaskKind::Transfer).await, TaskOutcome::Executed);
    assert_eq!(session.directory().peers().len(), 1);
    assert_eq!(log.requests_named(names::REGISTER_PEER).len(), 1);

    let register = gateway
        .requests()
        .into_iter()
        .filter(|r| r.path == paths::REGISTER)
        .nth(1)
        .unwrap();
    let body = register.body.unwrap();
    assert!(body["username"].as_str().unwrap().starts_with("peer_"));
    assert_eq!(body["password"], "P33rP@ss!2026");
}

#[tokio::test]
async fn failed_provisioning_falls_back_to_first_peer() {
    // The session itself plus one peer may register.
    let gateway = Arc::new(SimGateway::with_faults(SimFaults {
        registration_limit: Some(2),
        ..SimFaults::default()
    }));
    let mut session = payment_session(&gateway, 32);
    session.start().await;

    for _ in 0..60 {
        assert_eq!(session.run_task(TaskKind::Transfer).await, TaskOutcome::Executed);
    }
    let peers = session.directory().peers().to_vec();
    assert_eq!(peers.len(), 1);

    let targets: HashSet<String> = gateway
        .requests()
        .into_iter()
        .filter(|r| r.path == paths::TRANSFERS)
        .filter_map(|r| r.body)
        .filter_map(|b| b["targetAccountId"].as_str().map(str::to_string))
        .collect();
    assert_eq!(targets, HashSet::from([peers[0].clone()]));
}

#[tokio::test]
async fn failed_provisioning_with_empty_pool_skips() {
    let gateway = Arc::new(SimGateway::with_faults(SimFaults {
        reject_registration_prefix: Some("peer_".to_string()),
        ..SimFaults::default()
    }));
    let mut session = payment_session(&gateway, 33);
    session.start().await;
    assert!(session.account_id().is_some());

    assert_eq!(
        session.run_task(TaskKind::Transfer).await,
        TaskOutcome::Skipped(SkipReason::NoPeer)
    );
    assert!(session.directory().peers().is_empty());
    assert_eq!(session.keys_issued(), 0);
    assert_eq!(gateway.transfers_created(), 0);
}

#[tokio::test]
async fn peer_without_account_is_not_pooled() {
    let gateway = Arc::new(SimGateway::with_faults(SimFaults {
        empty_accounts: true,
        ..SimFaults::default()
    }));
    let (_log, sink) = event_log();
    let client = SessionClient::new(Arc::clone(&gateway), sink);
    let mut directory = AccountDirectory::default();
    let template = IdentityTemplate::new("peer", "P33rP@ss!2026");

    let peer = directory
        .provision_peer(&client, &template, &mut LoadRng::new(34))
        .await;
    assert_eq!(peer, None);
    assert!(directory.peers().is_empty());
}

proptest! {
    #[test]
    fn reuse_share_converges_to_configured_probability(seed in any::<u64>(), pool in 1usize..8) {
        let mut directory = AccountDirectory::default();
        for i in 0..pool {
            directory.push_peer(format!("P{i}"));
        }
        let mut rng = LoadRng::new(seed);
        let draws = 10_000u32;
        let mut reused = 0u32;
        for _ in 0..draws {
            match directory.choose(&mut rng) {
                PeerChoice::Reuse(id) => {
                    prop_assert!(directory.peers().contains(&id));
                    reused += 1;
                }
                PeerChoice::Provision => {}
            }
        }
        let share = f64::from(reused) / f64::from(draws);
        prop_assert!((share - 0.8).abs() < 0.03, "reuse share {}", share);
    }
}
