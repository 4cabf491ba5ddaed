//! Exactly-once verification of idempotent transfers.
//!
//! One key, one body, `attempts` sequential submissions. A correct gateway
//! answers exactly one `201 Created` and `attempts - 1` replays (`200 OK`).
//! Anything else is a correctness violation, which is reported as a
//! distinguished [`LoadEvent::Violation`] rather than as a failed request.
//!
//! Submissions are sequential: each one starts after the previous answer.
//! Exactly-once under concurrent identical submissions is not checked.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{self, TransferRequest, names};
use crate::client::SessionClient;
use crate::event::{LoadEvent, ReplayViolation};
use crate::transport::Transport;
use crate::LoadRng;

/// Submissions per verification unless a profile says otherwise.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Prefix of replay keys, which are `stress-<uuid>`.
pub const KEY_PREFIX: &str = "stress-";

/// Counts from one verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayOutcome {
    pub key: String,
    pub attempts: u32,
    /// `201` responses.
    pub created: u32,
    /// `200` responses.
    pub replayed: u32,
    /// Any other status, or no response at all.
    pub unexpected: u32,
    /// Responses carrying `Idempotency-Replayed: true`.
    pub replay_marked: u32,
}

impl ReplayOutcome {
    /// The exactly-once property: a single creation.
    pub fn holds(&self) -> bool {
        self.created == 1
    }

    /// Full agreement: one creation and every other attempt a replay.
    pub fn is_clean(&self) -> bool {
        self.holds() && self.replayed == self.attempts.saturating_sub(1)
    }

    /// Violation record, if the property does not hold.
    pub fn violation(&self, owner: &str) -> Option<ReplayViolation> {
        if self.holds() {
            return None;
        }
        Some(ReplayViolation {
            owner: owner.to_string(),
            key: self.key.clone(),
            attempts: self.attempts,
            created: self.created,
            replayed: self.replayed,
            unexpected: self.unexpected,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayVerifier {
    attempts: u32,
}

impl ReplayVerifier {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Builds a fresh `stress-<uuid>` key from the injected random source.
    pub fn new_key(rng: &mut LoadRng) -> String {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        format!("{KEY_PREFIX}{uuid}")
    }

    /// Submits one transfer `attempts` times under one key and classifies
    /// the answers.
    ///
    /// `owner` names the session in the violation record. A violation is
    /// recorded into the client's sink exactly once per call.
    ///
    /// The client must hold a bearer token. Without one nothing is sent and
    /// `None` is returned, since every attempt would fail before reaching
    /// the gateway.
    pub async fn verify_exactly_once<T: Transport>(
        &self,
        client: &SessionClient<T>,
        owner: &str,
        source: &str,
        target: &str,
        amount: Decimal,
        currency: &str,
        rng: &mut LoadRng,
    ) -> Option<ReplayOutcome> {
        if !client.is_authenticated() {
            debug!(owner, "replay verification needs a bearer token");
            return None;
        }

        let key = Self::new_key(rng);
        let transfer = TransferRequest::new(source, target, amount, currency);

        let mut outcome = ReplayOutcome {
            key: key.clone(),
            attempts: self.attempts,
            created: 0,
            replayed: 0,
            unexpected: 0,
            replay_marked: 0,
        };

        for attempt in 1..=self.attempts {
            match client
                .transfer(names::TRANSFERS_REPLAY, &transfer, &key)
                .await
            {
                Ok(response) => {
                    if response.is_replay_marked() {
                        outcome.replay_marked += 1;
                    }
                    match response.status {
                        api::STATUS_CREATED => outcome.created += 1,
                        api::STATUS_OK => outcome.replayed += 1,
                        status => {
                            debug!(%key, attempt, status, "unexpected replay status");
                            outcome.unexpected += 1;
                        }
                    }
                }
                Err(err) => {
                    debug!(%key, attempt, error = %err, "replay attempt got no response");
                    outcome.unexpected += 1;
                }
            }
        }

        if let Some(violation) = outcome.violation(owner) {
            warn!(
                owner,
                key = %violation.key,
                created = violation.created,
                replayed = violation.replayed,
                unexpected = violation.unexpected,
                "idempotency violation: {violation}"
            );
            client.sink().record(LoadEvent::Violation(violation));
        } else {
            debug!(%key, replayed = outcome.replayed, "replay verified");
        }

        Some(outcome)
    }
}

impl Default for ReplayVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS)
    }
}
