//! Session client: the transport plus an optional bearer token.
//!
//! Every request goes through [`SessionClient::send`], which times it and
//! records a [`RequestRecord`] into the event sink whatever the outcome. No
//! retries, and non-2xx statuses are returned to the caller untouched.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::api::{self, AccountSummary, AuthResponse, LoginBody, RegisterBody, TransferRequest};
use crate::error::TransportError;
use crate::event::{EventSink, LoadEvent, RequestRecord};
use crate::identity::Credential;
use crate::transport::{AUTHORIZATION, IDEMPOTENCY_KEY, Method, Request, Response, Transport};

/// Outcome of a single call: a response, or no response at all.
pub type CallResult = Result<Response, TransportError>;

pub struct SessionClient<T> {
    transport: Arc<T>,
    sink: Arc<dyn EventSink>,
    token: Option<String>,
}

impl<T: Transport> SessionClient<T> {
    /// Creates an unauthenticated client.
    pub fn new(transport: Arc<T>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            sink,
            token: None,
        }
    }

    /// Returns a client sharing this one's transport and sink but presenting
    /// a different token. Used to act on behalf of a freshly registered peer.
    pub fn for_token(&self, token: impl Into<String>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            token: Some(token.into()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Sends a request as-is and records the outcome under `name`.
    pub async fn send(&self, name: &'static str, request: Request) -> CallResult {
        let method = request.method;
        let started = Instant::now();
        let result = self.transport.send(request).await;
        let latency = started.elapsed();

        let record = match &result {
            Ok(response) => RequestRecord {
                name,
                method,
                status: Some(response.status),
                latency,
                ok: response.is_success(),
                error: None,
            },
            Err(err) => RequestRecord {
                name,
                method,
                status: None,
                latency,
                ok: false,
                error: Some(err.to_string()),
            },
        };
        debug!(name, status = ?record.status, latency_us = latency.as_micros() as u64, "request");
        self.sink.record(LoadEvent::Request(record));

        result
    }

    /// Sends a request with `Authorization: Bearer {token}` attached.
    ///
    /// Callers check [`SessionClient::is_authenticated`] first. Without a
    /// token nothing is sent and nothing is recorded.
    pub async fn authenticated_request(
        &self,
        name: &'static str,
        method: Method,
        path: impl Into<String>,
        body: Option<serde_json::Value>,
        extra_headers: &[(&str, &str)],
    ) -> CallResult {
        let Some(token) = self.token.as_deref() else {
            return Err(TransportError::Unauthenticated);
        };

        let mut request = match (method, body) {
            (Method::Post, Some(body)) => Request::post(path, body),
            (Method::Post, None) => Request::post(path, serde_json::Value::Null),
            (Method::Get, _) => Request::get(path),
        };
        request = request.with_header(AUTHORIZATION, format!("Bearer {token}"));
        for (name, value) in extra_headers {
            request = request.with_header(*name, *value);
        }

        self.send(name, request).await
    }

    pub async fn register(&self, name: &'static str, credential: &Credential) -> CallResult {
        let body = serde_json::to_value(RegisterBody::from(credential))?;
        self.send(name, Request::post(api::paths::REGISTER, body))
            .await
    }

    pub async fn login(&self, credential: &Credential) -> CallResult {
        let body = serde_json::to_value(LoginBody::from(credential))?;
        self.send(api::names::LOGIN, Request::post(api::paths::LOGIN, body))
            .await
    }

    pub async fn list_accounts(&self, name: &'static str) -> CallResult {
        self.authenticated_request(name, Method::Get, api::paths::ACCOUNTS, None, &[])
            .await
    }

    pub async fn get_account(&self, account_id: &str) -> CallResult {
        self.authenticated_request(
            api::names::ACCOUNT,
            Method::Get,
            api::paths::account(account_id),
            None,
            &[],
        )
        .await
    }

    pub async fn transfer(
        &self,
        name: &'static str,
        transfer: &TransferRequest,
        idempotency_key: &str,
    ) -> CallResult {
        self.authenticated_request(
            name,
            Method::Post,
            api::paths::TRANSFERS,
            Some(transfer.to_json()),
            &[(IDEMPOTENCY_KEY, idempotency_key)],
        )
        .await
    }
}

/// Extracts the bearer token from a register/login response with the
/// expected status.
pub fn token_from(result: &CallResult, expected_status: u16) -> Option<String> {
    match result {
        Ok(response) if response.status == expected_status => response
            .json::<AuthResponse>()
            .ok()
            .map(|auth| auth.token)
            .filter(|token| !token.is_empty()),
        _ => None,
    }
}

/// Extracts the first account id from an account listing response.
pub fn first_account_id(result: &CallResult) -> Option<String> {
    match result {
        Ok(response) if response.status == api::STATUS_OK => response
            .json::<Vec<AccountSummary>>()
            .ok()
            .and_then(|accounts| accounts.into_iter().next())
            .map(|account| account.id),
        _ => None,
    }
}
