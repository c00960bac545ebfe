//! Events emitted while a turn runs.
//!
//! Consumers subscribe to the receiver returned by the orchestrator
//! constructor. `Content` always carries the cumulative text, so a consumer
//! replaces what it shows instead of appending.
//!
//! The channel is unbounded. A receiver that is held but never read keeps
//! every event of every turn, each `Content` with a full copy of the text.
//! Drain it continuously or drop it.

use tokio::sync::mpsc;

use super::phase::TurnPhase;
use crate::conversation::types::{Message, StopReason};

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    PhaseChanged {
        phase: TurnPhase,
    },
    /// The user entry and the in-progress message were appended.
    Started {
        conversation_id: String,
        message_key: String,
    },
    Retrieved {
        conversation_id: String,
        message_key: String,
        relevant_content: Vec<String>,
        sources: Vec<String>,
        content_ids: Vec<String>,
    },
    Content {
        conversation_id: String,
        message_key: String,
        text: String,
    },
    /// Terminal event of a turn that reached the generation phase.
    Finished {
        conversation_id: String,
        message_key: String,
        stop_reason: StopReason,
        message: Message,
    },
    Error {
        conversation_id: String,
        notice: String,
        detail: String,
    },
}

/// Must be drained or dropped; see the module docs.
pub type EventReceiver = mpsc::UnboundedReceiver<GenerationEvent>;

/// Sending half. A dropped receiver is not an error.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: GenerationEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}
