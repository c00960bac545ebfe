//! Conversation-layer error types.

use thiserror::Error;

/// Errors raised by the message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Session not found or soft-deleted.
    #[error("session not found: '{session_id}'")]
    SessionNotFound { session_id: String },

    /// A stored column could not be decoded.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError {
            reason: e.to_string(),
        }
    }
}

/// Data that should never have reached the client.
///
/// Not recovered locally: it propagates out of the turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    #[error("missing '{language}' translation for '{owner}'")]
    MissingTranslation { owner: String, language: String },
}
