//! Wire types for the inference and usage-verification endpoints.
//!
//! Requests use the camelCase body the chat backend expects
//! (`systemPrompt`, `messages`, `maxTokens`, `stream`). Streaming responses
//! are decoded from either OpenAI-style completion chunks or bare
//! `{"text": …}` / `{"delta": …}` payloads.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// Message role.
///
/// Context entries only ever carry `User` or `Assistant`; `System` exists for
/// backends that want the system prompt inlined into `messages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Database / log representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A single `{role, content}` turn sent as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of a streaming generation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub stream: bool,
    /// Optional model pin; omitted so the backend uses its default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body of a usage-verification request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUsageRequest {
    pub text_to_verify: String,
    pub texts_to_verify_against: Vec<String>,
}

/// Usage-verification reply: a short completion such as `"yes"` or `"no"`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyUsageResponse {
    #[serde(alias = "text", alias = "result")]
    pub completion: String,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// One SSE `data:` payload. Tried in declaration order.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StreamPayload {
    Completion(ChatCompletionChunk),
    Text { text: String },
    Delta { delta: String },
}

impl StreamPayload {
    /// The text delta carried by this payload, if any.
    pub fn into_delta(self) -> Option<String> {
        let text = match self {
            StreamPayload::Completion(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content),
            StreamPayload::Text { text } => Some(text),
            StreamPayload::Delta { delta } => Some(delta),
        };
        text.filter(|t| !t.is_empty())
    }
}

/// OpenAI-compatible streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The delta within a chunk choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// Chain-of-thought from reasoning models. Never surfaced.
    #[serde(default)]
    #[allow(dead_code)]
    pub reasoning: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_is_camel_case() {
        let req = GenerationRequest {
            system_prompt: "be nice".to_string(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 256,
            stream: true,
            model: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["systemPrompt"], "be nice");
        assert_eq!(json["maxTokens"], 256);
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("model").is_none(), "model should be omitted when None");
    }

    #[test]
    fn test_verify_request_field_names() {
        let req = VerifyUsageRequest {
            text_to_verify: "answer".to_string(),
            texts_to_verify_against: vec!["source".to_string()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["textToVerify"], "answer");
        assert_eq!(json["textsToVerifyAgainst"][0], "source");
    }

    #[test]
    fn test_payload_openai_chunk() {
        let payload: StreamPayload = serde_json::from_str(
            r#"{"id":"c1","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(payload.into_delta().as_deref(), Some("Hel"));
    }

    #[test]
    fn test_payload_reasoning_only_has_no_delta() {
        let payload: StreamPayload = serde_json::from_str(
            r#"{"choices":[{"delta":{"reasoning":"thinking..."}}]}"#,
        )
        .unwrap();
        assert!(payload.into_delta().is_none());
    }

    #[test]
    fn test_payload_text_and_delta_shapes() {
        let text: StreamPayload = serde_json::from_str(r#"{"text":"a"}"#).unwrap();
        let delta: StreamPayload = serde_json::from_str(r#"{"delta":"b"}"#).unwrap();
        assert_eq!(text.into_delta().as_deref(), Some("a"));
        assert_eq!(delta.into_delta().as_deref(), Some("b"));
    }

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
    }
}
