//! HTTP client for the chat generation and usage-verification endpoints.
//!
//! Streams text deltas back from the generation endpoint, picking the SSE or
//! plain-text decoder from the response `Content-Type`. The returned stream
//! owns the response body; dropping it aborts the transfer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, RequestBuilder};

use super::errors::InferenceError;
use super::streaming::{parse_sse_stream, parse_text_stream};
use super::types::{GenerationRequest, VerifyUsageRequest, VerifyUsageResponse};
use crate::config::InferenceConfig;
use crate::generation::boundaries::{InferenceBackend, TokenStream, UsageVerifier};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for usage verification.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Total request timeout for streaming calls. Long prompts can take a while
/// before the first token arrives.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Model name reported when the config does not pin one.
const DEFAULT_MODEL_LABEL: &str = "default";

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the remote inference service.
pub struct InferenceClient {
    /// HTTP client for short requests (30s timeout).
    http: HttpClient,
    /// HTTP client for streaming requests (180s timeout).
    http_stream: HttpClient,
    stream_url: String,
    verify_url: String,
    model_name: String,
    pin_model: bool,
    api_key: Option<String>,
}

impl InferenceClient {
    /// Build a client from config. Does NOT check connectivity.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            stream_url: config.stream_url(),
            verify_url: config.verify_url(),
            model_name: config
                .model_name
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL_LABEL.to_string()),
            pin_model: config.model_name.is_some(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    // ─── Generation (streaming) ──────────────────────────────────────────

    /// Send a streaming generation request.
    pub async fn generate_stream(
        &self,
        mut request: GenerationRequest,
    ) -> Result<TokenStream, InferenceError> {
        request.stream = true;
        if self.pin_model && request.model.is_none() {
            request.model = Some(self.model_name.clone());
        }

        // Request metadata only; the body carries user text
        tracing::info!(
            url = %self.stream_url,
            message_count = request.messages.len(),
            system_prompt_len = request.system_prompt.len(),
            max_tokens = request.max_tokens,
            "generation request"
        );

        let response = self
            .authorize(self.http_stream.post(&self.stream_url))
            .json(&request)
            .header("Accept", "text/event-stream, text/plain")
            .send()
            .await
            .map_err(|e| {
                InferenceError::from_send(&self.stream_url, e, STREAM_REQUEST_TIMEOUT.as_secs())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body_len = body.len(), "generation request rejected");
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if is_event_stream(content_type.as_deref()) {
            Ok(Box::pin(parse_sse_stream(response.bytes_stream())))
        } else {
            tracing::debug!(content_type = ?content_type, "decoding generation body as plain text");
            Ok(Box::pin(parse_text_stream(response.bytes_stream())))
        }
    }

    // ─── Usage verification ──────────────────────────────────────────────

    /// Ask the service whether `text` cites any of `sources`.
    pub async fn check_usage(&self, text: &str, sources: &[String]) -> Result<bool, InferenceError> {
        let body = VerifyUsageRequest {
            text_to_verify: text.to_string(),
            texts_to_verify_against: sources.to_vec(),
        };

        let response = self
            .authorize(self.http.post(&self.verify_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_send(&self.verify_url, e, REQUEST_TIMEOUT.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|e| InferenceError::StreamError {
                reason: format!("failed to read verification body: {e}"),
            })?;
        let cited = interpret_verification(&raw);
        tracing::debug!(cited, sources = sources.len(), "usage verification");
        Ok(cited)
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    async fn open_stream(&self, request: GenerationRequest) -> Result<TokenStream, InferenceError> {
        self.generate_stream(request).await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl UsageVerifier for InferenceClient {
    async fn verify_usage(&self, text: &str, sources: &[String]) -> Result<bool, InferenceError> {
        self.check_usage(text, sources).await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
}

/// A JSON `{completion}` body or bare text. Affirmative when it starts with
/// "yes" or "true", case-insensitively.
fn interpret_verification(raw: &str) -> bool {
    let completion = serde_json::from_str::<VerifyUsageResponse>(raw)
        .map(|r| r.completion)
        .or_else(|_| serde_json::from_str::<String>(raw))
        .unwrap_or_else(|_| raw.to_string());
    let normalized = completion
        .trim_start_matches(|c: char| c.is_whitespace() || c == '"' || c == '*')
        .to_ascii_lowercase();
    normalized.starts_with("yes") || normalized.starts_with("true")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InferenceConfig {
        InferenceConfig {
            base_url: "http://localhost:9/".to_string(),
            stream_path: "/api/chat".to_string(),
            verify_path: "api/verify-usage".to_string(),
            model_name: None,
            max_context_tokens: 4096,
            max_output_tokens: 512,
            api_key: Some(String::new()),
        }
    }

    #[test]
    fn test_from_config_urls_and_defaults() {
        let client = InferenceClient::from_config(&config()).unwrap();
        assert_eq!(client.stream_url(), "http://localhost:9/api/chat");
        assert_eq!(client.verify_url, "http://localhost:9/api/verify-usage");
        assert_eq!(InferenceBackend::model_name(&client), "default");
        assert!(!client.pin_model);
        assert!(client.api_key.is_none(), "empty key is treated as absent");
    }

    #[test]
    fn test_is_event_stream() {
        assert!(is_event_stream(Some("text/event-stream")));
        assert!(is_event_stream(Some("Text/Event-Stream; charset=utf-8")));
        assert!(!is_event_stream(Some("text/plain; charset=utf-8")));
        assert!(!is_event_stream(None));
    }

    #[test]
    fn test_interpret_verification() {
        assert!(interpret_verification(r#"{"completion": "Yes, it does."}"#));
        assert!(interpret_verification(r#"{"text": "true"}"#));
        assert!(interpret_verification("\"yes\""));
        assert!(interpret_verification("  YES"));
        assert!(!interpret_verification(r#"{"completion": "No"}"#));
        assert!(!interpret_verification("maybe yes"));
    }

    #[tokio::test]
    async fn test_open_stream_connection_refused() {
        // Port 9 (discard) is not expected to accept HTTP
        let client = InferenceClient::from_config(&config()).unwrap();
        let request = GenerationRequest {
            system_prompt: "s".to_string(),
            messages: vec![],
            max_tokens: 16,
            stream: true,
            model: None,
        };
        let err = client.open_stream(request).await.err().unwrap();
        assert!(matches!(
            err,
            InferenceError::ConnectionFailed { .. } | InferenceError::Timeout { .. }
        ));
    }
}
