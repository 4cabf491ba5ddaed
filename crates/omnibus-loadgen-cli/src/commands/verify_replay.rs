//! One-off exactly-once check against a gateway.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use omnibus_loadgen::{
    EventLog, EventSink, LoadRng, ReplayOutcome, Role, SessionProfile, SimGateway, TaskKind,
    TaskOutcome, Transport, VirtualUserSession,
};
use tracing::info;

use crate::http::ReqwestTransport;
use crate::profiles;
use crate::style::{print_labeled, print_success, print_warn};

pub async fn run(
    project_dir: Option<&Path>,
    host: Option<String>,
    attempts: Option<u32>,
    seed: Option<u64>,
    simulate: bool,
) -> Result<()> {
    let mut config = super::load_config(project_dir)?;
    if let Some(host) = host {
        config.target.host = host;
    }

    let mut profile = profiles::profile_for(&config, Role::Idempotency)?;
    if let Some(attempts) = attempts {
        profile.replay_attempts = attempts;
    }
    profile.validate()?;

    let seed = seed
        .or(config.run.seed)
        .unwrap_or_else(|| LoadRng::from_entropy().seed());

    let outcome = if simulate {
        verify(Arc::new(SimGateway::new()), profile, seed).await?
    } else {
        let transport = ReqwestTransport::new(
            &config.target.host,
            Duration::from_secs(config.target.timeout_secs),
        )?;
        verify(Arc::new(transport), profile, seed).await?
    };

    print_labeled("Key", &outcome.key);
    print_labeled("Attempts", &outcome.attempts.to_string());
    print_labeled("Created", &outcome.created.to_string());
    print_labeled("Replayed", &outcome.replayed.to_string());
    print_labeled("Unexpected", &outcome.unexpected.to_string());
    print_labeled("Replay-marked", &outcome.replay_marked.to_string());

    if !outcome.holds() {
        bail!(
            "exactly-once violated: expected 1 created, got {} for key {}",
            outcome.created,
            outcome.key
        );
    }
    if outcome.is_clean() {
        print_success("Exactly one transfer created, every retry replayed");
    } else {
        print_warn("Exactly one transfer created, but some retries were not replays");
    }
    Ok(())
}

/// Starts one idempotency user and runs a single replay verification.
async fn verify<T: Transport>(
    transport: Arc<T>,
    profile: SessionProfile,
    seed: u64,
) -> Result<ReplayOutcome> {
    let log = Arc::new(EventLog::new());
    let sink: Arc<dyn EventSink> = log.clone();
    let mut session =
        VirtualUserSession::new(0, Arc::new(profile), transport, sink, LoadRng::new(seed));

    session.start().await;
    print_labeled("User", session.username());
    if let Some(account) = session.account_id() {
        print_labeled("Account", account);
    }

    let outcome = session.run_task(TaskKind::ReplayTransfer).await;
    info!(requests = log.request_count(), "replay verification finished");

    match outcome {
        TaskOutcome::Verified(outcome) => Ok(outcome),
        TaskOutcome::Skipped(reason) => {
            bail!("replay verification skipped: {}", reason.as_str())
        }
        TaskOutcome::Executed => bail!("replay task did not report an outcome"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnibus_loadgen::SimFaults;

    #[tokio::test]
    async fn simulated_gateway_holds() {
        let outcome = verify(Arc::new(SimGateway::new()), SessionProfile::idempotency(), 11)
            .await
            .unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.attempts, 5);
    }

    #[tokio::test]
    async fn broken_idempotency_is_reported() {
        let gateway = SimGateway::with_faults(SimFaults {
            broken_idempotency: true,
            ..SimFaults::default()
        });
        let outcome = verify(Arc::new(gateway), SessionProfile::idempotency(), 12)
            .await
            .unwrap();
        assert!(!outcome.holds());
        assert_eq!(outcome.created, 5);
    }

    #[tokio::test]
    async fn rejected_registration_skips() {
        let gateway = SimGateway::with_faults(SimFaults {
            reject_registrations: true,
            reject_logins: true,
            ..SimFaults::default()
        });
        let err = verify(Arc::new(gateway), SessionProfile::idempotency(), 13)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not-authenticated"));
    }
}
