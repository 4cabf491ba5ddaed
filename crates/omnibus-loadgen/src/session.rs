//! The virtual-user state machine.
//!
//! ```text
//! Unregistered ──start()──► Authenticating ──► Active ─┐
//!                                                ▲     │ step()
//!                                                └─────┘
//! ```
//!
//! Start-up never fails. A session that could not authenticate, or that has
//! no account, still reaches [`SessionState::Active`] and stays schedulable;
//! its tasks are then guarded no-ops recorded as skips. Task execution never
//! changes state: only the peer pool and the key counter move.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{self, TransferRequest, names};
use crate::client::{SessionClient, first_account_id, token_from};
use crate::directory::AccountDirectory;
use crate::event::{EventSink, LoadEvent, SkipReason};
use crate::idempotency::IdempotencyKeyGenerator;
use crate::identity::Credential;
use crate::profile::{SessionProfile, TaskKind};
use crate::replay::{ReplayOutcome, ReplayVerifier};
use crate::scheduler::StopSignal;
use crate::transport::Transport;
use crate::LoadRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unregistered,
    Authenticating,
    Active,
}

/// Result of running one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Requests were issued; their results went to the event sink.
    Executed,
    /// A replay verification ran.
    Verified(ReplayOutcome),
    /// A precondition was missing and nothing was sent.
    Skipped(SkipReason),
}

pub struct VirtualUserSession<T> {
    id: u64,
    profile: Arc<SessionProfile>,
    credential: Credential,
    state: SessionState,
    client: SessionClient<T>,
    directory: AccountDirectory,
    keys: IdempotencyKeyGenerator,
    verifier: ReplayVerifier,
    rng: LoadRng,
}

impl<T: Transport> VirtualUserSession<T> {
    /// Creates a session with a fresh credential drawn from `rng`.
    pub fn new(
        id: u64,
        profile: Arc<SessionProfile>,
        transport: Arc<T>,
        sink: Arc<dyn EventSink>,
        mut rng: LoadRng,
    ) -> Self {
        let credential = profile.identity.new_credential(&mut rng);
        let keys = IdempotencyKeyGenerator::new(credential.username.clone());
        let directory = AccountDirectory::new(profile.peer_reuse_probability);
        let verifier = ReplayVerifier::new(profile.replay_attempts);

        Self {
            id,
            profile,
            credential,
            state: SessionState::Unregistered,
            client: SessionClient::new(transport, sink),
            directory,
            keys,
            verifier,
            rng,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    pub fn token(&self) -> Option<&str> {
        self.client.token()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.directory.own_account()
    }

    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    /// Number of idempotency keys issued by this session.
    pub fn keys_issued(&self) -> u64 {
        self.keys.issued()
    }

    /// Register-or-login, then own account, then (for some roles) a peer.
    pub async fn start(&mut self) -> SessionState {
        self.state = SessionState::Authenticating;

        let registered = self
            .client
            .register(names::REGISTER, &self.credential)
            .await;
        let token = match token_from(&registered, api::STATUS_CREATED) {
            Some(token) => Some(token),
            None => {
                debug!(user = %self.credential.username, "registration rejected, trying login");
                let logged_in = self.client.login(&self.credential).await;
                token_from(&logged_in, api::STATUS_OK)
            }
        };

        if let Some(token) = token {
            self.client.set_token(token);
            let listed = self.client.list_accounts(names::ACCOUNTS_SETUP).await;
            match first_account_id(&listed) {
                Some(id) => self.directory.set_own_account(id),
                None => warn!(user = %self.credential.username, "no account found, session idle"),
            }
        } else {
            warn!(user = %self.credential.username, "register and login both failed, session idle");
        }

        if self.profile.provision_peer_on_start && self.directory.own_account().is_some() {
            let peer = self
                .directory
                .provision_peer(&self.client, &self.profile.peer_identity, &mut self.rng)
                .await;
            if peer.is_none() {
                warn!(user = %self.credential.username, "start-up peer provisioning failed");
            }
        }

        self.state = SessionState::Active;
        info!(
            session = self.id,
            role = %self.profile.role,
            user = %self.credential.username,
            authenticated = self.is_authenticated(),
            account = self.directory.own_account().is_some(),
            "session started"
        );
        self.client.sink().record(LoadEvent::SessionStarted {
            role: self.profile.role,
            username: self.credential.username.clone(),
            authenticated: self.is_authenticated(),
            has_account: self.directory.own_account().is_some(),
        });

        self.state
    }

    /// Draws the pause before the next task.
    pub fn next_think_time(&mut self) -> Duration {
        self.profile.think_time(&mut self.rng)
    }

    /// Chooses one task by weight and runs it.
    pub async fn step(&mut self) -> TaskOutcome {
        let task = self.profile.choose_task(&mut self.rng);
        self.run_task(task).await
    }

    /// Runs a specific task, subject to its guards.
    pub async fn run_task(&mut self, task: TaskKind) -> TaskOutcome {
        let outcome = match self.check_preconditions(task) {
            Err(reason) => TaskOutcome::Skipped(reason),
            Ok(()) => match task {
                TaskKind::Transfer => self.transfer().await,
                TaskKind::CheckBalance => self.check_balance().await,
                TaskKind::ListAccounts => self.list_accounts().await,
                TaskKind::ReplayTransfer => self.replay_transfer().await,
                TaskKind::BurstTransfer => self.burst_transfer().await,
            },
        };

        if let TaskOutcome::Skipped(reason) = outcome {
            debug!(user = %self.credential.username, task = %task, reason = reason.as_str(), "task skipped");
            self.client.sink().record(LoadEvent::Skipped {
                role: self.profile.role,
                task,
                reason,
            });
        }
        outcome
    }

    /// Runs the session until `stop` fires: start-up, then think-time wait
    /// and one task per iteration. A pending wait is abandoned on stop; an
    /// in-flight task is allowed to finish.
    pub async fn run(mut self, mut stop: StopSignal) -> Self {
        if stop.is_stopped() {
            return self;
        }
        self.start().await;

        loop {
            let think_time = self.next_think_time();
            tokio::select! {
                () = tokio::time::sleep(think_time) => {}
                () = stop.stopped() => break,
            }
            if stop.is_stopped() {
                break;
            }
            self.step().await;
        }

        debug!(session = self.id, keys = self.keys.issued(), peers = self.directory.peers().len(), "session stopped");
        self
    }

    fn check_preconditions(&self, task: TaskKind) -> Result<(), SkipReason> {
        if !self.client.is_authenticated() {
            return Err(SkipReason::NotAuthenticated);
        }
        if task.needs_account() && self.directory.own_account().is_none() {
            return Err(SkipReason::NoAccount);
        }
        if matches!(task, TaskKind::ReplayTransfer | TaskKind::BurstTransfer)
            && self.directory.fallback().is_none()
        {
            return Err(SkipReason::NoPeer);
        }
        Ok(())
    }

    fn own_account(&self) -> Option<String> {
        self.directory.own_account().map(str::to_string)
    }

    async fn transfer(&mut self) -> TaskOutcome {
        let Some(source) = self.own_account() else {
            return TaskOutcome::Skipped(SkipReason::NoAccount);
        };
        let Some(target) = self
            .directory
            .acquire_peer(&self.client, &self.profile.peer_identity, &mut self.rng)
            .await
        else {
            return TaskOutcome::Skipped(SkipReason::NoPeer);
        };

        let amount = self.profile.amount.draw(&mut self.rng);
        let key = self.keys.next_key(&mut self.rng).to_string();
        let transfer = TransferRequest::new(source, target, amount, &self.profile.currency)
            .with_description(format!("Load test transfer {key}"));

        let _ = self.client.transfer(names::TRANSFERS, &transfer, &key).await;
        TaskOutcome::Executed
    }

    async fn check_balance(&mut self) -> TaskOutcome {
        let Some(account) = self.own_account() else {
            return TaskOutcome::Skipped(SkipReason::NoAccount);
        };
        let _ = self.client.get_account(&account).await;
        TaskOutcome::Executed
    }

    async fn list_accounts(&mut self) -> TaskOutcome {
        let _ = self.client.list_accounts(names::ACCOUNTS).await;
        TaskOutcome::Executed
    }

    async fn replay_transfer(&mut self) -> TaskOutcome {
        let (Some(source), Some(target)) =
            (self.own_account(), self.directory.fallback().map(str::to_string))
        else {
            return TaskOutcome::Skipped(SkipReason::NoPeer);
        };

        let amount = self.profile.amount.draw(&mut self.rng);
        let verified = self
            .verifier
            .verify_exactly_once(
                &self.client,
                &self.credential.username,
                &source,
                &target,
                amount,
                &self.profile.currency,
                &mut self.rng,
            )
            .await;
        match verified {
            Some(outcome) => TaskOutcome::Verified(outcome),
            None => TaskOutcome::Skipped(SkipReason::NotAuthenticated),
        }
    }

    async fn burst_transfer(&mut self) -> TaskOutcome {
        let (Some(source), Some(target)) =
            (self.own_account(), self.directory.fallback().map(str::to_string))
        else {
            return TaskOutcome::Skipped(SkipReason::NoPeer);
        };

        let amount = self.profile.amount.draw(&mut self.rng);
        let key = self.keys.next_burst_key();
        let transfer = TransferRequest::new(source, target, amount, &self.profile.currency);

        let _ = self
            .client
            .transfer(names::TRANSFERS_BURST, &transfer, &key)
            .await;
        TaskOutcome::Executed
    }
}
