//! Per-session account directory: the session's own account and the pool of
//! peer accounts it has provisioned as transfer targets.
//!
//! The pool only ever grows and is never shared between sessions. A failed
//! provisioning attempt is not retried; the caller falls back to an existing
//! peer, or to no peer at all.

use tracing::debug;

use crate::api::names;
use crate::client::{SessionClient, first_account_id, token_from};
use crate::identity::IdentityTemplate;
use crate::transport::Transport;
use crate::{LoadRng, api};

/// Default probability of reusing a pooled peer rather than provisioning one.
pub const DEFAULT_REUSE_PROBABILITY: f64 = 0.8;

/// What to do when a transfer target is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerChoice {
    /// Use this pooled peer.
    Reuse(String),
    /// Provision a fresh peer.
    Provision,
}

#[derive(Debug, Clone)]
pub struct AccountDirectory {
    own: Option<String>,
    peers: Vec<String>,
    reuse_probability: f64,
}

impl AccountDirectory {
    pub fn new(reuse_probability: f64) -> Self {
        Self {
            own: None,
            peers: Vec::new(),
            reuse_probability: reuse_probability.clamp(0.0, 1.0),
        }
    }

    pub fn own_account(&self) -> Option<&str> {
        self.own.as_deref()
    }

    pub fn set_own_account(&mut self, id: impl Into<String>) {
        self.own = Some(id.into());
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Adds a peer to the pool. Duplicates are ignored.
    pub fn push_peer(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.peers.contains(&id) {
            self.peers.push(id);
        }
    }

    /// Oldest pooled peer, used when provisioning fails.
    pub fn fallback(&self) -> Option<&str> {
        self.peers.first().map(String::as_str)
    }

    /// Decides between reuse and provisioning.
    ///
    /// An empty pool always provisions. Otherwise a uniformly chosen peer is
    /// reused with the configured probability.
    pub fn choose(&self, rng: &mut LoadRng) -> PeerChoice {
        if self.peers.is_empty() || !rng.next_bool(self.reuse_probability) {
            return PeerChoice::Provision;
        }
        let index = rng.next_index(self.peers.len());
        PeerChoice::Reuse(self.peers[index].clone())
    }

    /// Returns a transfer target: a pooled peer, or a freshly provisioned one.
    pub async fn acquire_peer<T: Transport>(
        &mut self,
        client: &SessionClient<T>,
        template: &IdentityTemplate,
        rng: &mut LoadRng,
    ) -> Option<String> {
        match self.choose(rng) {
            PeerChoice::Reuse(id) => Some(id),
            PeerChoice::Provision => self.provision_peer(client, template, rng).await,
        }
    }

    /// Registers a new peer user, reads its account id, and pools it.
    ///
    /// On any failure the oldest pooled peer is returned instead, or `None`
    /// if the pool is empty.
    pub async fn provision_peer<T: Transport>(
        &mut self,
        client: &SessionClient<T>,
        template: &IdentityTemplate,
        rng: &mut LoadRng,
    ) -> Option<String> {
        let credential = template.new_credential(rng);
        let registered = client.register(names::REGISTER_PEER, &credential).await;

        let Some(token) = token_from(&registered, api::STATUS_CREATED) else {
            debug!(peer = %credential.username, "peer registration failed");
            return self.fallback().map(str::to_string);
        };

        let peer_client = client.for_token(token);
        let listed = peer_client.list_accounts(names::ACCOUNTS_PEER_SETUP).await;
        match first_account_id(&listed) {
            Some(id) => {
                debug!(peer = %credential.username, account = %id, "peer provisioned");
                self.push_peer(id.clone());
                Some(id)
            }
            None => {
                debug!(peer = %credential.username, "peer has no account");
                self.fallback().map(str::to_string)
            }
        }
    }
}

impl Default for AccountDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_REUSE_PROBABILITY)
    }
}
