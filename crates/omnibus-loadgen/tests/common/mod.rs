//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use omnibus_loadgen::{EventLog, EventSink, Request, Response, Transport, TransportError};
use serde_json::Value;

/// Transport that answers from a fixed script, in order, and records every
/// request it receives. Runs out as a connection failure.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response, TransportError>>>,
    received: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: Value) -> Self {
        self.push(Ok(Response::new(status).with_json(&body)))
    }

    pub fn respond_replayed(self, body: Value) -> Self {
        self.push(Ok(Response::new(200)
            .with_json(&body)
            .with_header("Idempotency-Replayed", "true")))
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.push(Err(error))
    }

    fn push(self, entry: Result<Response, TransportError>) -> Self {
        self.script.lock().unwrap().push_back(entry);
        self
    }

    pub fn received(&self) -> Vec<Request> {
        self.received.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        self.received.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".to_string())));
        std::future::ready(next)
    }
}

pub fn event_log() -> (Arc<EventLog>, Arc<dyn EventSink>) {
    let log = Arc::new(EventLog::new());
    let sink = Arc::clone(&log) as Arc<dyn EventSink>;
    (log, sink)
}
