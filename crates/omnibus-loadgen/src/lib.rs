//! # omnibus-loadgen: Virtual-user load generation for the Omnibus gateway
//!
//! Drives the payment gateway's HTTP API with many concurrent simulated users
//! and checks the one correctness property a load test can observe from the
//! outside: an idempotent transfer repeated under one key is executed exactly
//! once.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ LoadScheduler                                                 │
//! │  spawn rate, role class weights, run time, stop signal        │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ VirtualUserSession (one tokio task per user)            │  │
//! │  │  SessionProfile  LoadRng  IdempotencyKeyGenerator       │  │
//! │  │  AccountDirectory (peer pool)  ReplayVerifier           │  │
//! │  │  SessionClient ──► Transport (reqwest │ SimGateway)     │  │
//! │  └────────────────────────┬────────────────────────────────┘  │
//! │                           │ LoadEvent                         │
//! │                           ▼                                   │
//! │                 RunStats ──► RunReport                        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Every random decision (credentials, task choice, peer reuse, amounts,
//! key suffixes, think time) goes through an injected [`LoadRng`]. Each
//! session forks its own from the run seed, so a run against
//! [`SimGateway`] is reproducible.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use omnibus_loadgen::{LoadScheduler, RunConfig, SimGateway, stop_signal};
//!
//! let scheduler = LoadScheduler::new(Arc::new(SimGateway::new()), RunConfig::default())?;
//! let (_handle, stop) = stop_signal();
//! let report = scheduler.run(stop).await;
//! assert!(report.passed());
//! ```

// Statistics use f64 for rates and shares
#![allow(clippy::cast_precision_loss)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod api;
pub mod client;
pub mod directory;
mod error;
pub mod event;
pub mod idempotency;
pub mod identity;
pub mod profile;
pub mod replay;
mod rng;
pub mod scheduler;
pub mod session;
pub mod sim_gateway;
pub mod stats;
pub mod transport;

pub use client::SessionClient;
pub use directory::{AccountDirectory, PeerChoice};
pub use error::{KeyParseError, LoadgenError, Result, TransportError};
pub use event::{EventLog, EventSink, LoadEvent, ReplayViolation, RequestRecord, SkipReason};
pub use idempotency::{IdempotencyKey, IdempotencyKeyGenerator};
pub use identity::{Credential, IdentityTemplate};
pub use profile::{AmountPolicy, Role, SessionProfile, TaskKind, TaskWeight};
pub use replay::{ReplayOutcome, ReplayVerifier};
pub use rng::LoadRng;
pub use scheduler::{LoadScheduler, RunConfig, StopHandle, StopSignal, stop_signal};
pub use session::{SessionState, TaskOutcome, VirtualUserSession};
pub use sim_gateway::{RecordedRequest, SimFaults, SimGateway};
pub use stats::{RunReport, RunStats, RunSummary};
pub use transport::{Method, Request, Response, Transport};
