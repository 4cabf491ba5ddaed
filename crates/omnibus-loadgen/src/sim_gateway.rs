//! In-memory payment gateway.
//!
//! Models the six endpoints the load generator drives closely enough to
//! exercise every session path: registration opens one USD account with a
//! starting balance, transfers move money between accounts, and repeated
//! transfers under one `Idempotency-Key` are answered from a per-user cache
//! with `200 OK` and `Idempotency-Replayed: true`.
//!
//! [`SimFaults`] injects the failures a load test must tolerate, plus a
//! canary mode that breaks idempotency outright.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use rust_decimal::Decimal;
use serde_json::{Value, json};

use crate::api::{LoginBody, RegisterBody, TransferRequest, paths};
use crate::error::TransportError;
use crate::identity::Credential;
use crate::transport::{
    AUTHORIZATION, IDEMPOTENCY_KEY, IDEMPOTENCY_REPLAYED, Method, Request, Response, Transport,
};

/// Balance every new account opens with: 10000.0000.
pub fn starting_balance() -> Decimal {
    Decimal::new(100_000_000, 4)
}

/// Currency of every simulated account.
pub const CURRENCY: &str = "USD";

/// Failure injection knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Every registration answers `503`.
    pub reject_registrations: bool,
    /// Registrations whose username starts with this prefix answer `503`.
    pub reject_registration_prefix: Option<String>,
    /// Registrations beyond this many successful ones answer `503`.
    pub registration_limit: Option<u64>,
    /// Every login answers `401`.
    pub reject_logins: bool,
    /// Account listings are always empty.
    pub empty_accounts: bool,
    /// Canary: replays execute again and answer `201`.
    pub broken_idempotency: bool,
}

/// A request as seen by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub idempotency_key: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug)]
struct SimUser {
    password: String,
    accounts: Vec<String>,
}

#[derive(Debug)]
struct SimAccount {
    owner: String,
    balance: Decimal,
}

#[derive(Debug)]
struct StoredTransfer {
    fingerprint: Value,
    response: Value,
}

#[derive(Debug, Default)]
struct SimState {
    users: HashMap<String, SimUser>,
    tokens: HashMap<String, String>,
    accounts: BTreeMap<String, SimAccount>,
    idempotency: HashMap<(String, String), StoredTransfer>,
    registrations: u64,
    next_id: u64,
    next_token: u64,
    transfers_created: u64,
    log: Vec<RecordedRequest>,
}

impl SimState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_id)
    }

    fn issue_token(&mut self, username: &str) -> String {
        self.next_token += 1;
        let token = format!("tok-{}", self.next_token);
        self.tokens.insert(token.clone(), username.to_string());
        token
    }

    fn create_user(&mut self, username: &str, password: &str) -> String {
        let account_id = self.next_id();
        self.accounts.insert(
            account_id.clone(),
            SimAccount {
                owner: username.to_string(),
                balance: starting_balance(),
            },
        );
        self.users.insert(
            username.to_string(),
            SimUser {
                password: password.to_string(),
                accounts: vec![account_id],
            },
        );
        self.registrations += 1;
        self.issue_token(username)
    }
}

/// In-memory [`Transport`] implementation of the gateway.
#[derive(Debug, Default)]
pub struct SimGateway {
    faults: SimFaults,
    state: Mutex<SimState>,
}

impl SimGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: SimFaults) -> Self {
        Self {
            faults,
            state: Mutex::default(),
        }
    }

    pub fn faults(&self) -> &SimFaults {
        &self.faults
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a user directly, bypassing faults. Returns its token.
    pub fn register_user(&self, credential: &Credential) -> String {
        self.lock()
            .create_user(&credential.username, &credential.password)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().log.clone()
    }

    /// Transfers that were executed (replays excluded).
    pub fn transfers_created(&self) -> u64 {
        self.lock().transfers_created
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn balance(&self, account_id: &str) -> Option<Decimal> {
        self.lock().accounts.get(account_id).map(|a| a.balance)
    }

    /// Answers one request.
    pub fn handle(&self, request: &Request) -> Response {
        let mut state = self.lock();
        state.log.push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            authorization: request.header(AUTHORIZATION).map(str::to_string),
            idempotency_key: request.header(IDEMPOTENCY_KEY).map(str::to_string),
            body: request.body.clone(),
        });

        match (request.method, request.path.as_str()) {
            (Method::Post, paths::REGISTER) => self.register(&mut state, request),
            (Method::Post, paths::LOGIN) => self.login(&mut state, request),
            (Method::Get, paths::ACCOUNTS) => self.list_accounts(&state, request),
            (Method::Post, paths::TRANSFERS) => self.transfer(&mut state, request),
            (Method::Get, path) => {
                let id = path
                    .strip_prefix(paths::ACCOUNTS)
                    .and_then(|rest| rest.strip_prefix('/'));
                match id {
                    Some(id) if !id.is_empty() && !id.contains('/') => {
                        get_account(&state, request, id)
                    }
                    _ => error(404, "not found"),
                }
            }
            _ => error(404, "not found"),
        }
    }

    fn register(&self, state: &mut SimState, request: &Request) -> Response {
        let Some(body) = parse_body::<RegisterBody>(request) else {
            return error(400, "malformed registration");
        };
        if body.username.is_empty() || body.password.is_empty() || !body.email.contains('@') {
            return error(400, "invalid registration");
        }

        let prefix_rejected = self
            .faults
            .reject_registration_prefix
            .as_deref()
            .is_some_and(|prefix| body.username.starts_with(prefix));
        let over_limit = self
            .faults
            .registration_limit
            .is_some_and(|limit| state.registrations >= limit);
        if self.faults.reject_registrations || prefix_rejected || over_limit {
            return error(503, "registration unavailable");
        }

        if state.users.contains_key(&body.username) {
            return error(409, "username already exists");
        }

        let token = state.create_user(&body.username, &body.password);
        Response::new(201).with_json(&json!({ "token": token, "username": body.username }))
    }

    fn login(&self, state: &mut SimState, request: &Request) -> Response {
        let Some(body) = parse_body::<LoginBody>(request) else {
            return error(400, "malformed login");
        };
        if self.faults.reject_logins {
            return error(401, "invalid credentials");
        }
        let valid = state
            .users
            .get(&body.username)
            .is_some_and(|user| user.password == body.password);
        if !valid {
            return error(401, "invalid credentials");
        }

        let token = state.issue_token(&body.username);
        Response::new(200).with_json(&json!({ "token": token, "username": body.username }))
    }

    fn list_accounts(&self, state: &SimState, request: &Request) -> Response {
        let Some(username) = authenticate(state, request) else {
            return error(401, "unauthorized");
        };
        if self.faults.empty_accounts {
            return Response::new(200).with_json(&json!([]));
        }

        let accounts: Vec<Value> = state
            .users
            .get(username)
            .map(|user| user.accounts.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| state.accounts.get(id).map(|account| account_json(id, account)))
            .collect();
        Response::new(200).with_json(&Value::Array(accounts))
    }

    fn transfer(&self, state: &mut SimState, request: &Request) -> Response {
        let Some(username) = authenticate(state, request).map(str::to_string) else {
            return error(401, "unauthorized");
        };
        let Some(key) = request.header(IDEMPOTENCY_KEY).filter(|k| !k.is_empty()) else {
            return error(400, "missing Idempotency-Key header");
        };
        let fingerprint = request.body.clone().unwrap_or(Value::Null);
        let cache_key = (username.clone(), key.to_string());

        if !self.faults.broken_idempotency {
            if let Some(stored) = state.idempotency.get(&cache_key) {
                if stored.fingerprint != fingerprint {
                    return error(422, "Idempotency-Key reused with a different request");
                }
                return Response::new(200)
                    .with_json(&stored.response)
                    .with_header(IDEMPOTENCY_REPLAYED, "true");
            }
        }

        let Some(transfer) = parse_body::<TransferRequest>(request) else {
            return error(400, "malformed transfer");
        };
        let amount = transfer.amount.round_dp(4);
        if amount <= Decimal::ZERO {
            return error(400, "amount must be positive");
        }
        if transfer.currency != CURRENCY {
            return error(400, "unsupported currency");
        }
        if transfer.source_account_id == transfer.target_account_id {
            return error(400, "source and target accounts must differ");
        }
        match state.accounts.get(&transfer.source_account_id) {
            None => return error(404, "source account not found"),
            Some(source) if source.owner != username => {
                return error(403, "source account belongs to another user");
            }
            Some(source) if source.balance < amount => return error(422, "insufficient funds"),
            Some(_) => {}
        }
        if !state.accounts.contains_key(&transfer.target_account_id) {
            return error(404, "target account not found");
        }

        if let Some(source) = state.accounts.get_mut(&transfer.source_account_id) {
            source.balance -= amount;
        }
        if let Some(target) = state.accounts.get_mut(&transfer.target_account_id) {
            target.balance += amount;
        }
        state.transfers_created += 1;

        let transfer_id = state.next_id();
        let response = json!({
            "id": transfer_id,
            "sourceAccountId": transfer.source_account_id,
            "targetAccountId": transfer.target_account_id,
            "amount": amount.to_string(),
            "currency": transfer.currency,
            "status": "COMPLETED",
        });
        state.idempotency.insert(
            cache_key,
            StoredTransfer {
                fingerprint,
                response: response.clone(),
            },
        );
        Response::new(201).with_json(&response)
    }
}

impl Transport for SimGateway {
    fn send(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        std::future::ready(Ok(self.handle(&request)))
    }
}

fn get_account(state: &SimState, request: &Request, id: &str) -> Response {
    let Some(username) = authenticate(state, request) else {
        return error(401, "unauthorized");
    };
    match state.accounts.get(id) {
        None => error(404, "account not found"),
        Some(account) if account.owner != username => error(403, "forbidden"),
        Some(account) => Response::new(200).with_json(&account_json(id, account)),
    }
}

fn authenticate<'a>(state: &'a SimState, request: &Request) -> Option<&'a str> {
    let token = request.header(AUTHORIZATION)?.strip_prefix("Bearer ")?;
    state.tokens.get(token).map(String::as_str)
}

fn parse_body<T: serde::de::DeserializeOwned>(request: &Request) -> Option<T> {
    request
        .body
        .as_ref()
        .and_then(|body| serde_json::from_value(body.clone()).ok())
}

fn account_json(id: &str, account: &SimAccount) -> Value {
    json!({
        "id": id,
        "currency": CURRENCY,
        "balance": account.balance.to_string(),
    })
}

fn error(status: u16, message: &str) -> Response {
    Response::new(status).with_json(&json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn register(gateway: &SimGateway, username: &str) -> (String, String) {
        let response = gateway.handle(&Request::post(
            paths::REGISTER,
            json!({
                "username": username,
                "email": format!("{username}@loadtest.local"),
                "password": "pw",
            }),
        ));
        assert_eq!(response.status, 201);
        let token = response.json::<Value>().unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();
        let listed = gateway.handle(
            &Request::get(paths::ACCOUNTS).with_header(AUTHORIZATION, format!("Bearer {token}")),
        );
        let account = listed.json::<Value>().unwrap()[0]["id"]
            .as_str()
            .unwrap()
            .to_string();
        (token, account)
    }

    fn transfer(token: &str, key: &str, source: &str, target: &str, amount: f64) -> Request {
        Request::post(
            paths::TRANSFERS,
            json!({
                "sourceAccountId": source,
                "targetAccountId": target,
                "amount": amount,
                "currency": "USD",
            }),
        )
        .with_header(AUTHORIZATION, format!("Bearer {token}"))
        .with_header(IDEMPOTENCY_KEY, key)
    }

    #[test]
    fn replay_is_answered_from_cache() {
        let gateway = SimGateway::new();
        let (token, a1) = register(&gateway, "alice");
        let (_, a2) = register(&gateway, "bob");

        let first = gateway.handle(&transfer(&token, "k1", &a1, &a2, 4.5));
        let second = gateway.handle(&transfer(&token, "k1", &a1, &a2, 4.5));

        assert_eq!(first.status, 201);
        assert!(!first.is_replay_marked());
        assert_eq!(second.status, 200);
        assert!(second.is_replay_marked());
        assert_eq!(first.body, second.body);
        assert_eq!(gateway.transfers_created(), 1);
        assert_eq!(gateway.balance(&a2), Some(Decimal::from_str("10004.5").unwrap()));
    }

    #[test]
    fn key_reuse_with_different_body_is_rejected() {
        let gateway = SimGateway::new();
        let (token, a1) = register(&gateway, "alice");
        let (_, a2) = register(&gateway, "bob");

        gateway.handle(&transfer(&token, "k1", &a1, &a2, 1.0));
        let reused = gateway.handle(&transfer(&token, "k1", &a1, &a2, 2.0));
        assert_eq!(reused.status, 422);
    }

    #[test]
    fn broken_idempotency_executes_every_replay() {
        let gateway = SimGateway::with_faults(SimFaults {
            broken_idempotency: true,
            ..SimFaults::default()
        });
        let (token, a1) = register(&gateway, "alice");
        let (_, a2) = register(&gateway, "bob");

        for _ in 0..3 {
            let response = gateway.handle(&transfer(&token, "k1", &a1, &a2, 1.0));
            assert_eq!(response.status, 201);
        }
        assert_eq!(gateway.transfers_created(), 3);
    }

    #[test]
    fn self_transfer_is_rejected() {
        let gateway = SimGateway::new();
        let (token, a1) = register(&gateway, "alice");
        let response = gateway.handle(&transfer(&token, "k1", &a1, &a1, 1.0));
        assert_eq!(response.status, 400);
    }

    #[test]
    fn foreign_source_account_is_forbidden() {
        let gateway = SimGateway::new();
        let (token, _) = register(&gateway, "alice");
        let (_, b1) = register(&gateway, "bob");
        let (_, c1) = register(&gateway, "carol");
        let response = gateway.handle(&transfer(&token, "k1", &b1, &c1, 1.0));
        assert_eq!(response.status, 403);
    }

    #[test]
    fn duplicate_username_conflicts() {
        let gateway = SimGateway::new();
        register(&gateway, "alice");
        let response = gateway.handle(&Request::post(
            paths::REGISTER,
            json!({ "username": "alice", "email": "alice@loadtest.local", "password": "pw" }),
        ));
        assert_eq!(response.status, 409);
    }

    #[test]
    fn registration_limit_applies_after_successes() {
        let gateway = SimGateway::with_faults(SimFaults {
            registration_limit: Some(1),
            ..SimFaults::default()
        });
        register(&gateway, "alice");
        let response = gateway.handle(&Request::post(
            paths::REGISTER,
            json!({ "username": "bob", "email": "bob@loadtest.local", "password": "pw" }),
        ));
        assert_eq!(response.status, 503);
    }

    #[test]
    fn account_reads_require_ownership() {
        let gateway = SimGateway::new();
        let (token, a1) = register(&gateway, "alice");
        let (_, b1) = register(&gateway, "bob");
        let auth = format!("Bearer {token}");

        let read = |id: &str| {
            gateway.handle(&Request::get(paths::account(id)).with_header(AUTHORIZATION, auth.as_str()))
        };

        let own = read(&a1);
        let other = read(&b1);
        let missing = read("nope");
        let anonymous = gateway.handle(&Request::get(paths::account(&a1)));

        assert_eq!(own.status, 200);
        assert_eq!(own.json::<Value>().unwrap()["balance"], "10000.0000");
        assert_eq!(other.status, 403);
        assert_eq!(missing.status, 404);
        assert_eq!(anonymous.status, 401);
    }
}
