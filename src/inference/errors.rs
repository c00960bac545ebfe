//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the inference or usage-verification
/// endpoints.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response. `body` is the (possibly empty) error body.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Chunk-level failure while reading or decoding the stream.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// HTTP status code, if this is an `HttpError`.
    pub fn status(&self) -> Option<u16> {
        match self {
            InferenceError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Extract the error body text, if this is an `HttpError` with a body.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }

    /// Map a `reqwest` send failure onto the taxonomy.
    pub(crate) fn from_send(endpoint: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout {
                duration_secs: timeout_secs,
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_http_error() {
        let err = InferenceError::HttpError {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.error_body(), Some("slow down"));
    }

    #[test]
    fn test_error_body_empty_is_none() {
        let err = InferenceError::HttpError {
            status: 502,
            body: String::new(),
        };
        assert!(err.error_body().is_none());
    }

    #[test]
    fn test_error_body_non_http() {
        let err = InferenceError::Timeout { duration_secs: 5 };
        assert!(err.status().is_none());
        assert!(err.error_body().is_none());
    }

    #[test]
    fn test_display_includes_status() {
        let err = InferenceError::HttpError {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }
}
