//! Collaborator contracts consumed by the orchestrator.
//!
//! Each boundary is an object-safe async trait so the orchestrator can hold
//! `Arc<dyn …>` handles. HTTP implementations live in [`crate::inference`];
//! the SQLite store lives in [`crate::conversation::database`]. Tests swap in
//! scripted fakes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::conversation::errors::StoreError;
use crate::conversation::types::{
    ContextEntry, NewMessage, PageRequest, SessionRecord, StoredMessage,
};
use crate::inference::errors::InferenceError;
use crate::inference::retrieval::{RetrievalError, RetrievalQuery, RetrievedFragment};
use crate::inference::types::GenerationRequest;

pub use crate::conversation::tokens::TokenCounter;

/// Text deltas from an open generation stream. Dropping it aborts the
/// underlying transfer.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, InferenceError>> + Send + 'static>>;

/// Inference stream boundary.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Send the request and return once the response headers are in.
    ///
    /// Non-2xx responses fail here with `HttpError`; chunk-level failures
    /// surface as `Err` items on the stream.
    async fn open_stream(&self, request: GenerationRequest) -> Result<TokenStream, InferenceError>;

    /// Recorded as `llm_model_used` on every message.
    fn model_name(&self) -> &str;
}

/// Usage-verification boundary.
#[async_trait]
pub trait UsageVerifier: Send + Sync {
    /// Whether `text` actually draws on any of `sources`.
    async fn verify_usage(&self, text: &str, sources: &[String]) -> Result<bool, InferenceError>;
}

/// Retrieval (RAG) boundary.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked fragments, best first.
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedFragment>, RetrievalError>;
}

/// Persistence boundary.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_session(&self, character_id: &str) -> Result<SessionRecord, StoreError>;

    /// Persist a finalized message. The store assigns timestamp and position.
    async fn add_message(&self, session_id: &str, message: &NewMessage) -> Result<StoredMessage, StoreError>;

    /// Soft-delete a session. Its messages stay on disk.
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;

    /// One page of messages, oldest first within the page. Page 0 is newest.
    async fn fetch_messages(&self, session_id: &str, page: PageRequest) -> Result<Vec<StoredMessage>, StoreError>;

    /// The newest whole user/assistant pairs fitting `max_tokens`, oldest first.
    async fn fetch_context(&self, session_id: &str, max_tokens: u32) -> Result<Vec<ContextEntry>, StoreError>;
}
