//! Generation pipeline: one user turn from validation to a committed (or
//! rolled back) message.
//!
//! The [`GenerationOrchestrator`] owns the conversation logs and drives each
//! turn through the collaborator boundaries in [`boundaries`]. Progress is
//! published as [`GenerationEvent`]s; phase and cancellation are tracked by
//! the single-flight [`TurnGate`].

pub mod boundaries;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod phase;
pub mod session;

pub use boundaries::{InferenceBackend, MessageStore, Retriever, TokenStream, UsageVerifier};
pub use errors::{GenerationError, TransportError, ValidationError};
pub use events::{EventReceiver, GenerationEvent};
pub use orchestrator::{GenerationOrchestrator, GenerationSettings, TurnOutcome, TurnRequest};
pub use phase::{TurnGate, TurnGuard, TurnPhase};
pub use session::{LoadedHistory, RecoveryReport};
