//! Shared types for the conversation logs and the message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inference::types::{ChatMessage, Role};

// ─── Context ─────────────────────────────────────────────────────────────────

/// One role-tagged turn sent to the model as history.
///
/// Immutable once appended; only ever dropped from the head or the tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
    pub token_count: u32,
}

impl ContextEntry {
    pub fn new(role: Role, content: impl Into<String>, token_count: u32) -> Self {
        Self {
            role,
            content: content.into(),
            token_count,
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// Why a generation stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Network or HTTP failure.
    Error,
    /// Abort requested by the caller.
    Cancel,
    /// Normal close with content.
    Finish,
    /// Closed without producing any content.
    StreamEmpty,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Error => "error",
            StopReason::Cancel => "cancel",
            StopReason::Finish => "finish",
            StopReason::StreamEmpty => "stream_empty",
        }
    }

    pub fn parse(s: &str) -> Option<StopReason> {
        match s {
            "error" => Some(StopReason::Error),
            "cancel" => Some(StopReason::Cancel),
            "finish" => Some(StopReason::Finish),
            "stream_empty" => Some(StopReason::StreamEmpty),
            _ => None,
        }
    }
}

/// One display record: the human input and the AI output it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub raw_human: Option<String>,
    pub raw_ai: String,
    pub created_at: DateTime<Utc>,
    /// Per-conversation sequence number. Assigned by the log on append.
    pub position: u64,
    pub stop_reason: Option<StopReason>,
    pub ai_token_count: u32,
    pub human_token_count: u32,
    pub llm_model_used: String,
    pub relevant_content: Option<Vec<String>>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub content_ids: Vec<String>,
}

impl Message {
    /// An in-progress message for a user turn. `raw_ai` starts empty.
    pub fn pending(raw_human: impl Into<String>, human_token_count: u32, model: &str) -> Self {
        Self {
            raw_human: Some(raw_human.into()),
            raw_ai: String::new(),
            created_at: Utc::now(),
            position: 0,
            stop_reason: None,
            ai_token_count: 0,
            human_token_count,
            llm_model_used: model.to_string(),
            relevant_content: None,
            sources: Vec::new(),
            content_ids: Vec::new(),
        }
    }

    /// The store payload: everything except timestamp and position.
    pub fn to_new(&self) -> NewMessage {
        NewMessage {
            raw_human: self.raw_human.clone(),
            raw_ai: self.raw_ai.clone(),
            stop_reason: self.stop_reason,
            ai_token_count: self.ai_token_count,
            human_token_count: self.human_token_count,
            llm_model_used: self.llm_model_used.clone(),
            relevant_content: self.relevant_content.clone(),
            sources: self.sources.clone(),
            content_ids: self.content_ids.clone(),
        }
    }
}

/// A message as handed to the store, without timestamp and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub raw_human: Option<String>,
    pub raw_ai: String,
    pub stop_reason: Option<StopReason>,
    pub ai_token_count: u32,
    pub human_token_count: u32,
    pub llm_model_used: String,
    pub relevant_content: Option<Vec<String>>,
    pub sources: Vec<String>,
    pub content_ids: Vec<String>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub position: u64,
    pub created_at: DateTime<Utc>,
    pub message: NewMessage,
}

impl StoredMessage {
    pub fn into_message(self) -> Message {
        let m = self.message;
        Message {
            raw_human: m.raw_human,
            raw_ai: m.raw_ai,
            created_at: self.created_at,
            position: self.position,
            stop_reason: m.stop_reason,
            ai_token_count: m.ai_token_count,
            human_token_count: m.human_token_count,
            llm_model_used: m.llm_model_used,
            relevant_content: m.relevant_content,
            sources: m.sources,
            content_ids: m.content_ids,
        }
    }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub character_id: String,
    pub created_at: DateTime<Utc>,
}

/// A page of history. Page 0 is the newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self { page: 0, page_size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_wire_names() {
        let json = serde_json::to_string(&StopReason::StreamEmpty).unwrap();
        assert_eq!(json, "\"stream_empty\"");
        for reason in [
            StopReason::Error,
            StopReason::Cancel,
            StopReason::Finish,
            StopReason::StreamEmpty,
        ] {
            assert_eq!(StopReason::parse(reason.as_str()), Some(reason));
        }
    }

    #[test]
    fn test_pending_message_is_empty() {
        let msg = Message::pending("hello", 2, "model-a");
        assert_eq!(msg.raw_human.as_deref(), Some("hello"));
        assert!(msg.raw_ai.is_empty());
        assert!(msg.stop_reason.is_none());
        assert_eq!(msg.to_new().llm_model_used, "model-a");
    }

    #[test]
    fn test_page_offset() {
        let page = PageRequest {
            page: 3,
            page_size: 20,
        };
        assert_eq!(page.offset(), 60);
    }
}
