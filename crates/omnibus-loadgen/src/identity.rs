//! Synthetic credentials for virtual users and their peers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LoadRng;

/// Length of the random username suffix.
pub const SUFFIX_LEN: usize = 12;

/// Domain used for every generated email address.
pub const EMAIL_DOMAIN: &str = "loadtest.local";

/// Username/email/password triple used to register with the gateway.
///
/// Generated once, never mutated, never reused by another session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-role recipe for minting credentials: a username prefix and the fixed
/// password every user of that role registers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTemplate {
    pub prefix: String,
    pub password: String,
}

impl IdentityTemplate {
    pub fn new(prefix: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            password: password.into(),
        }
    }

    /// Mints a fresh credential: `{prefix}_{12 lowercase alphanumerics}`.
    ///
    /// Consumes entropy from `rng` only.
    pub fn new_credential(&self, rng: &mut LoadRng) -> Credential {
        let suffix = rng.lower_alphanumeric(SUFFIX_LEN);
        let username = format!("{}_{suffix}", self.prefix);
        let email = format!("{username}@{EMAIL_DOMAIN}");
        Credential {
            username,
            email,
            password: self.password.clone(),
        }
    }
}
