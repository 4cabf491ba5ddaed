//! reqwest-backed transport for live gateways.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use omnibus_loadgen::{Method, Request, Response, Transport, TransportError};

/// Sends requests to `base_url` over HTTP. No retries; every status is
/// handed back as a response.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("omnibus-loadgen/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn classify(err: &reqwest::Error, timeout_ms: u64) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout_ms)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, TransportError>> + Send {
        let client = self.client.clone();
        let url = self.url(&request.path);
        let timeout_ms = self.timeout_ms;

        async move {
            let mut builder = match request.method {
                Method::Get => client.get(&url),
                Method::Post => client.post(&url),
            };
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| classify(&e, timeout_ms))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| classify(&e, timeout_ms))?
                .to_vec();

            Ok(Response {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let transport =
            ReqwestTransport::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url("/api/v1/accounts"),
            "http://localhost:8080/api/v1/accounts"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        // Port 9 (discard) on loopback is closed on any sane test host.
        let transport = ReqwestTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = transport.send(Request::get("/api/v1/accounts")).await;
        assert!(matches!(
            result,
            Err(TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Other(_))
        ));
    }
}
