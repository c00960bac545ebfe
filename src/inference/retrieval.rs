//! HTTP retrieval (RAG) client.
//!
//! POSTs a camelCase query to the configured search endpoint and returns the
//! ranked fragments. Cancellation is handled by the caller dropping the
//! future; the orchestrator races it against the turn's token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::generation::boundaries::Retriever;

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for a search.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("invalid retrieval response: {reason}")]
    InvalidResponse { reason: String },
}

/// Query body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalQuery {
    pub text: String,
    pub language_code: String,
    pub hashtags: Vec<String>,
    pub secondary_hashtags: Vec<String>,
    pub similarity_threshold: f32,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One ranked fragment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedFragment {
    pub content: String,
    pub similarity: f32,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub content_id: Option<String>,
}

/// The endpoint may answer with a bare array or `{ "results": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RetrievalResponse {
    Bare(Vec<RetrievedFragment>),
    Wrapped { results: Vec<RetrievedFragment> },
}

impl RetrievalResponse {
    fn into_fragments(self) -> Vec<RetrievedFragment> {
        match self {
            RetrievalResponse::Bare(f) | RetrievalResponse::Wrapped { results: f } => f,
        }
    }
}

// ─── RetrievalClient ────────────────────────────────────────────────────────

pub struct RetrievalClient {
    http: HttpClient,
    url: String,
}

impl RetrievalClient {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RetrievalError::ConnectionFailed {
                endpoint: config.url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        tracing::debug!(
            url = %self.url,
            threshold = query.similarity_threshold,
            hashtags = query.hashtags.len(),
            query_len = query.text.len(),
            "retrieval request"
        );

        let response = self
            .http
            .post(&self.url)
            .json(query)
            .send()
            .await
            .map_err(|e| RetrievalError::ConnectionFailed {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| RetrievalError::InvalidResponse {
                reason: e.to_string(),
            })?;
        parse_fragments(&text)
    }
}

#[async_trait]
impl Retriever for RetrievalClient {
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        self.search(query).await
    }
}

/// Decode a response body and order it best first.
fn parse_fragments(body: &str) -> Result<Vec<RetrievedFragment>, RetrievalError> {
    let response: RetrievalResponse =
        serde_json::from_str(body).map_err(|e| RetrievalError::InvalidResponse {
            reason: e.to_string(),
        })?;
    let mut fragments = response.into_fragments();
    fragments.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    Ok(fragments)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_wire_shape() {
        let query = RetrievalQuery {
            text: "what is virtue".to_string(),
            language_code: "en".to_string(),
            hashtags: vec!["ethics".to_string()],
            secondary_hashtags: vec![],
            similarity_threshold: 0.75,
            max_results: 2,
            user_id: None,
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["languageCode"], "en");
        assert_eq!(json["secondaryHashtags"], serde_json::json!([]));
        assert_eq!(json["maxResults"], 2);
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_parse_bare_array_sorted() {
        let body = r#"[
            {"content": "low", "similarity": 0.61},
            {"content": "high", "similarity": 0.9, "sourceUrl": "https://a", "contentId": "c1"}
        ]"#;
        let fragments = parse_fragments(body).unwrap();
        assert_eq!(fragments[0].content, "high");
        assert_eq!(fragments[0].source_url.as_deref(), Some("https://a"));
        assert_eq!(fragments[1].content_id, None);
    }

    #[test]
    fn test_parse_wrapped_results() {
        let body = r#"{"results": [{"content": "x", "similarity": 0.8}]}"#;
        assert_eq!(parse_fragments(body).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        assert!(matches!(
            parse_fragments("not json"),
            Err(RetrievalError::InvalidResponse { .. })
        ));
    }
}
