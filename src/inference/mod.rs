//! Inference, usage-verification and retrieval clients.
//!
//! This module handles all communication with the remote services:
//! - Streaming generation (SSE or plain chunked text)
//! - Usage verification of retrieved content
//! - Retrieval of relevant content fragments
//!
//! The HTTP clients implement the boundary traits in
//! [`crate::generation::boundaries`], so the orchestrator never depends on
//! reqwest directly.

pub mod client;
pub mod errors;
pub mod retrieval;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use errors::InferenceError;
pub use retrieval::{RetrievalClient, RetrievalError, RetrievalQuery, RetrievedFragment};
pub use types::{ChatMessage, GenerationRequest, Role};
