//! Exactly-once replay verification against scripted and simulated gateways.

mod common;

use std::str::FromStr;
use std::sync::Arc;

use common::{ScriptedTransport, event_log};
use omnibus_loadgen::api::names;
use omnibus_loadgen::{
    LoadRng, ReplayVerifier, SessionClient, SessionProfile, SimFaults, SimGateway, TaskKind,
    TaskOutcome, TransportError, VirtualUserSession,
};
use rust_decimal::Decimal;
use serde_json::json;

fn transfer_body() -> serde_json::Value {
    json!({ "id": "T1", "status": "COMPLETED" })
}

#[tokio::test]
async fn correct_gateway_answers_one_created_and_four_replays() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(201, transfer_body())
            .respond_replayed(transfer_body())
            .respond_replayed(transfer_body())
            .respond_replayed(transfer_body())
            .respond_replayed(transfer_body()),
    );
    let (log, sink) = event_log();
    let client = SessionClient::new(Arc::clone(&transport), sink).for_token("T");
    let mut rng = LoadRng::new(99);

    let outcome = ReplayVerifier::default()
        .verify_exactly_once(
            &client,
            "idem_ab12cd34ef56",
            "A1",
            "A2",
            Decimal::from_str("4.50").unwrap(),
            "USD",
            &mut rng,
        )
        .await
        .unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.replayed, 4);
    assert_eq!(outcome.unexpected, 0);
    assert_eq!(outcome.replay_marked, 4);
    assert!(outcome.is_clean());
    assert!(log.violations().is_empty());

    let sent = transport.received();
    assert_eq!(sent.len(), 5);
    let key = sent[0].header("Idempotency-Key").unwrap().to_string();
    assert!(key.starts_with("stress-"));
    assert_eq!(key, outcome.key);
    for request in &sent {
        assert_eq!(request.path, "/api/v1/transfers");
        assert_eq!(request.header("Idempotency-Key"), Some(key.as_str()));
        assert_eq!(request.header("Authorization"), Some("Bearer T"));
        assert_eq!(request.body, sent[0].body);
    }
    let body = sent[0].body.as_ref().unwrap();
    assert_eq!(body["sourceAccountId"], "A1");
    assert_eq!(body["targetAccountId"], "A2");
    assert_eq!(body["amount"].as_f64(), Some(4.5));
    assert_eq!(body["currency"], "USD");

    assert_eq!(log.requests_named(names::TRANSFERS_REPLAY).len(), 5);
}

#[tokio::test]
async fn order_of_created_response_does_not_matter() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond_replayed(transfer_body())
            .respond_replayed(transfer_body())
            .respond(201, transfer_body())
            .respond_replayed(transfer_body())
            .respond_replayed(transfer_body()),
    );
    let (log, sink) = event_log();
    let client = SessionClient::new(transport, sink).for_token("T");

    let outcome = ReplayVerifier::default()
        .verify_exactly_once(
            &client,
            "idem_x",
            "A1",
            "A2",
            Decimal::ONE,
            "USD",
            &mut LoadRng::new(1),
        )
        .await
        .unwrap();

    assert!(outcome.holds());
    assert!(log.violations().is_empty());
}

#[tokio::test]
async fn unexpected_statuses_and_transport_errors_are_a_third_bucket() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(500, json!({ "error": "boom" }))
            .respond(201, transfer_body())
            .fail(TransportError::Timeout(30_000))
            .respond_replayed(transfer_body())
            .respond(409, json!({ "error": "in progress" })),
    );
    let (log, sink) = event_log();
    let client = SessionClient::new(transport, sink).for_token("T");

    let outcome = ReplayVerifier::default()
        .verify_exactly_once(
            &client,
            "idem_x",
            "A1",
            "A2",
            Decimal::ONE,
            "USD",
            &mut LoadRng::new(2),
        )
        .await
        .unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.replayed, 1);
    assert_eq!(outcome.unexpected, 3);
    assert!(outcome.holds());
    assert!(!outcome.is_clean());
    assert!(log.violations().is_empty());
}

#[tokio::test]
async fn missing_creation_raises_one_violation() {
    let transport = Arc::new(
        (0..5).fold(ScriptedTransport::new(), |script, _| {
            script.respond(503, json!({ "error": "unavailable" }))
        }),
    );
    let (log, sink) = event_log();
    let client = SessionClient::new(transport, sink).for_token("T");

    let outcome = ReplayVerifier::default()
        .verify_exactly_once(
            &client,
            "idem_x",
            "A1",
            "A2",
            Decimal::ONE,
            "USD",
            &mut LoadRng::new(3),
        )
        .await
        .unwrap();

    assert_eq!(outcome.created, 0);
    let violations = log.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].unexpected, 5);
    assert_eq!(violations[0].owner, "idem_x");
}

#[tokio::test]
async fn unauthenticated_client_sends_nothing_and_records_no_violation() {
    let transport = Arc::new(ScriptedTransport::new());
    let (log, sink) = event_log();
    let client = SessionClient::new(Arc::clone(&transport), sink);

    let outcome = ReplayVerifier::default()
        .verify_exactly_once(
            &client,
            "idem_x",
            "A1",
            "A2",
            Decimal::ONE,
            "USD",
            &mut LoadRng::new(5),
        )
        .await;

    assert_eq!(outcome, None);
    assert!(transport.received().is_empty());
    assert!(log.violations().is_empty());
    assert_eq!(log.request_count(), 0);
}

#[tokio::test]
async fn idempotency_session_verifies_against_simulated_gateway() {
    let gateway = Arc::new(SimGateway::new());
    let (log, sink) = event_log();
    let mut session = VirtualUserSession::new(
        1,
        Arc::new(SessionProfile::idempotency()),
        Arc::clone(&gateway),
        sink,
        LoadRng::new(4),
    );
    session.start().await;

    let TaskOutcome::Verified(outcome) = session.run_task(TaskKind::ReplayTransfer).await else {
        panic!("replay task did not run");
    };
    assert!(outcome.is_clean());
    assert_eq!(outcome.replay_marked, 4);
    assert_eq!(gateway.transfers_created(), 1);
    assert!(log.violations().is_empty());

    let peer = session.directory().peers()[0].clone();
    let amount = gateway.balance(&peer).unwrap() - omnibus_loadgen::sim_gateway::starting_balance();
    assert!(amount > Decimal::ONE && amount <= Decimal::TEN);
}

#[tokio::test]
async fn broken_idempotency_is_reported_exactly_once_per_verification() {
    let gateway = Arc::new(SimGateway::with_faults(SimFaults {
        broken_idempotency: true,
        ..SimFaults::default()
    }));
    let (log, sink) = event_log();
    let mut session = VirtualUserSession::new(
        1,
        Arc::new(SessionProfile::idempotency()),
        Arc::clone(&gateway),
        sink,
        LoadRng::new(5),
    );
    session.start().await;

    let outcome = session.run_task(TaskKind::ReplayTransfer).await;
    assert!(matches!(outcome, TaskOutcome::Verified(ref o) if o.created == 5));
    assert_eq!(gateway.transfers_created(), 5);

    let violations = log.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].created, 5);
    assert_eq!(violations[0].owner, session.username());
}
