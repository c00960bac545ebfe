//! Generation error taxonomy.
//!
//! - [`ValidationError`]: rejected locally, before any network call or log
//!   mutation.
//! - [`TransportError`]: network / HTTP / store failures. Recovered inside the
//!   orchestrator (rollback + [`TransportError::user_notice`] toast) and never
//!   returned from a turn.
//! - [`GenerationError`]: what `send_turn` itself may return.
//!
//! Aborts are not errors at all; they end a turn silently.

use thiserror::Error;

use crate::conversation::errors::{DataIntegrityError, StoreError};
use crate::inference::errors::InferenceError;
use crate::inference::retrieval::RetrievalError;

/// Input rejected before the turn starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input is empty")]
    EmptyInput,

    #[error("no input surface is attached")]
    NoInputSurface,

    #[error("input needs {used} tokens but the context budget is {limit}")]
    InputExceedsBudget { used: u32, limit: u32 },
}

/// A failed call to one of the remote collaborators.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransportError {
    /// Short, user-facing message for a toast.
    pub fn user_notice(&self) -> String {
        match self {
            TransportError::Inference(InferenceError::HttpError { status: 429, .. }) => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            TransportError::Inference(InferenceError::HttpError { status, .. }) if *status >= 500 => {
                "The assistant is unavailable right now. Please try again.".to_string()
            }
            TransportError::Inference(InferenceError::HttpError { .. }) => {
                "The assistant could not process this message.".to_string()
            }
            TransportError::Inference(InferenceError::Timeout { .. }) => {
                "The assistant took too long to respond. Please try again.".to_string()
            }
            TransportError::Inference(InferenceError::ConnectionFailed { .. })
            | TransportError::Retrieval(RetrievalError::ConnectionFailed { .. }) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            TransportError::Inference(_) => {
                "The response was interrupted. Please try again.".to_string()
            }
            TransportError::Retrieval(_) => {
                "Could not look up related content. Please try again.".to_string()
            }
            TransportError::Store(_) => "Your conversation could not be saved.".to_string(),
        }
    }
}

/// Errors returned by `send_turn`.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Another turn is in flight.
    #[error("a turn is already in progress")]
    Busy,

    #[error("invalid turn: {0}")]
    Validation(#[from] ValidationError),

    /// Seed data defect. Propagated on purpose.
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_notice_by_status() {
        let rate_limited = TransportError::from(InferenceError::HttpError {
            status: 429,
            body: String::new(),
        });
        assert!(rate_limited.user_notice().contains("Too many requests"));

        let server = TransportError::from(InferenceError::HttpError {
            status: 503,
            body: "down".to_string(),
        });
        assert!(server.user_notice().contains("unavailable"));

        let retrieval = TransportError::from(RetrievalError::HttpError {
            status: 500,
            body: String::new(),
        });
        assert!(retrieval.user_notice().contains("related content"));
    }

    #[test]
    fn test_validation_display() {
        let err = GenerationError::from(ValidationError::InputExceedsBudget { used: 10, limit: 5 });
        assert_eq!(
            err.to_string(),
            "invalid turn: input needs 10 tokens but the context budget is 5"
        );
    }
}
