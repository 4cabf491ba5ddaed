//! Error types for the load generator core.
//!
//! Soft failures (a rejected registration, a missing token, a 5xx on a
//! balance check) are not errors here: they surface as recorded outcomes and
//! skips. These types cover the transport capability failing outright and
//! configurations that cannot drive a session at all.

use thiserror::Error;

/// Result type for load generator operations.
pub type Result<T> = std::result::Result<T, LoadgenError>;

/// Errors raised while building profiles or starting a run.
#[derive(Debug, Error)]
pub enum LoadgenError {
    /// A session profile cannot drive a virtual user.
    #[error("invalid profile '{role}': {reason}")]
    InvalidProfile { role: String, reason: String },

    /// The run configuration is unusable.
    #[error("invalid run configuration: {0}")]
    InvalidRun(String),
}

impl LoadgenError {
    /// Creates an `InvalidProfile` error for the given role.
    pub fn invalid_profile(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            role: role.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of the opaque HTTP capability itself.
///
/// A response with a non-2xx status is not a `TransportError`; only the
/// absence of any response is.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never reached the gateway.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The response arrived but its body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The response body was not the JSON shape the caller expected.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// An authenticated call was attempted without a bearer token. Nothing
    /// was sent.
    #[error("no bearer token")]
    Unauthenticated,

    /// Any other transport-level failure.
    #[error("{0}")]
    Other(String),
}

/// Errors raised when parsing an idempotency key string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    /// The key does not have `{owner}-{sequence}-{suffix}` shape.
    #[error("malformed idempotency key: {0}")]
    Malformed(String),

    /// The sequence component is not a positive integer.
    #[error("invalid sequence number in idempotency key: {0}")]
    InvalidSequence(String),

    /// The random suffix is not 8 lowercase hex characters.
    #[error("invalid random suffix in idempotency key: {0}")]
    InvalidSuffix(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_name_the_problem() {
        let err = LoadgenError::invalid_profile("burst", "task weights sum to zero");
        assert_eq!(err.to_string(), "invalid profile 'burst': task weights sum to zero");

        let err = LoadgenError::InvalidRun("users must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid run configuration: users must be at least 1"
        );
    }

    #[test]
    fn transport_errors_stay_transport_errors() {
        assert_eq!(TransportError::Timeout(250).to_string(), "request timed out after 250ms");
        assert_eq!(TransportError::Unauthenticated.to_string(), "no bearer token");
    }
}
