//! Gateway HTTP surface: paths, statistics names and wire bodies.
//!
//! Paths and field names must match the gateway exactly. Statistics names
//! group requests by logical endpoint (and by why they were sent) so the run
//! report does not fan out into one row per account id.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::identity::Credential;

pub mod paths {
    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ACCOUNTS: &str = "/api/v1/accounts";
    pub const TRANSFERS: &str = "/api/v1/transfers";

    /// Path of a single account.
    pub fn account(id: &str) -> String {
        format!("{ACCOUNTS}/{id}")
    }
}

/// Statistics names attached to every recorded request.
pub mod names {
    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const REGISTER_PEER: &str = "/api/v1/auth/register [peer]";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ACCOUNTS: &str = "/api/v1/accounts";
    pub const ACCOUNTS_SETUP: &str = "/api/v1/accounts [setup]";
    pub const ACCOUNTS_PEER_SETUP: &str = "/api/v1/accounts [peer-setup]";
    pub const ACCOUNT: &str = "/api/v1/accounts/{id}";
    pub const TRANSFERS: &str = "/api/v1/transfers";
    pub const TRANSFERS_REPLAY: &str = "/api/v1/transfers [idempotency-replay]";
    pub const TRANSFERS_BURST: &str = "/api/v1/transfers [burst]";
}

/// Status the gateway answers a successful registration with.
pub const STATUS_CREATED: u16 = 201;
/// Status for a successful login, read, or replayed transfer.
pub const STATUS_OK: u16 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl From<&Credential> for RegisterBody {
    fn from(credential: &Credential) -> Self {
        Self {
            username: credential.username.clone(),
            email: credential.email.clone(),
            password: credential.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

impl From<&Credential> for LoginBody {
    fn from(credential: &Credential) -> Self {
        Self {
            username: credential.username.clone(),
            password: credential.password.clone(),
        }
    }
}

/// The part of a register/login response the client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

/// The part of an account listing entry the client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSummary {
    pub id: String,
}

/// Transfer body. The idempotency key travels as a header, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_account_id: String,
    pub target_account_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn new(
        source_account_id: impl Into<String>,
        target_account_id: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            source_account_id: source_account_id.into(),
            target_account_id: target_account_id.into(),
            amount,
            currency: currency.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Body as sent on the wire; `amount` is a JSON number.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "sourceAccountId": self.source_account_id,
            "targetAccountId": self.target_account_id,
            "amount": self.amount.to_f64(),
            "currency": self.currency,
        });
        if let Some(description) = &self.description {
            body["description"] = serde_json::Value::from(description.as_str());
        }
        body
    }
}
