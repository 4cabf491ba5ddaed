//! Result events emitted by sessions.
//!
//! Sessions never aggregate anything themselves. Every observable outcome is
//! pushed into an [`EventSink`]: the scheduler feeds a channel drained by
//! [`crate::RunStats`], tests collect into an [`EventLog`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::profile::{Role, TaskKind};
use crate::transport::Method;

/// One request as observed by a session.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    /// Statistics name (see [`crate::api::names`]).
    pub name: &'static str,
    pub method: Method,
    /// `None` when the transport produced no response.
    pub status: Option<u16>,
    pub latency: Duration,
    /// 2xx response.
    pub ok: bool,
    /// Transport failure description, if any.
    pub error: Option<String>,
}

/// Why a task did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Start-up never obtained a bearer token.
    NotAuthenticated,
    /// Authenticated, but no own account id was found.
    NoAccount,
    /// No peer account could be resolved.
    NoPeer,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotAuthenticated => "not-authenticated",
            SkipReason::NoAccount => "no-account",
            SkipReason::NoPeer => "no-peer",
        }
    }
}

/// Exactly-once replay invariant broken: a correctness defect in the gateway,
/// as opposed to an availability failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayViolation {
    pub owner: String,
    pub key: String,
    pub attempts: u32,
    pub created: u32,
    pub replayed: u32,
    pub unexpected: u32,
}

impl std::fmt::Display for ReplayViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expected 1 CREATED, got {} (replayed={}, unexpected={}) for key {}",
            self.created, self.replayed, self.unexpected, self.key
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LoadEvent {
    SessionStarted {
        role: Role,
        username: String,
        authenticated: bool,
        has_account: bool,
    },
    Request(RequestRecord),
    Skipped {
        role: Role,
        task: TaskKind,
        reason: SkipReason,
    },
    Violation(ReplayViolation),
}

/// Destination for session events. Must be shareable across sessions.
pub trait EventSink: Send + Sync {
    fn record(&self, event: LoadEvent);
}

impl EventSink for mpsc::UnboundedSender<LoadEvent> {
    fn record(&self, event: LoadEvent) {
        // The receiver only goes away once the run is being torn down.
        let _ = self.send(event);
    }
}

/// In-memory event collector.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LoadEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<LoadEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded requests with the given statistics name.
    pub fn requests_named(&self, name: &str) -> Vec<RequestRecord> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                LoadEvent::Request(record) if record.name == name => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| matches!(event, LoadEvent::Request(_)))
            .count()
    }

    pub fn violations(&self) -> Vec<ReplayViolation> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                LoadEvent::Violation(violation) => Some(violation),
                _ => None,
            })
            .collect()
    }

    pub fn skips(&self) -> Vec<(TaskKind, SkipReason)> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                LoadEvent::Skipped { task, reason, .. } => Some((task, reason)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for EventLog {
    fn record(&self, event: LoadEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
