//! Client configuration loading and validation.
//!
//! Reads `duologue.yaml` and resolves environment variables before parsing.
//! Config is the single source of truth for endpoints, token budgets and the
//! refusal pattern set.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "duologue.yaml";

/// Env var pointing directly at a config file.
pub const CONFIG_ENV_VAR: &str = "DUOLOGUE_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while locating, reading or validating the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find {file_name}")]
    NotFound { file_name: String },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Inference endpoint and budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub base_url: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_verify_path")]
    pub verify_path: String,
    /// Reported as `llm_model_used` on every message. Sent as `model` when set.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Hard ceiling for history + input tokens on every turn.
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl InferenceConfig {
    pub fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    pub fn verify_url(&self) -> String {
        join_url(&self.base_url, &self.verify_path)
    }
}

/// Retrieval (RAG) settings. Absent section disables retrieval.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub url: String,
    /// Inputs shorter than this skip retrieval.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_primary_threshold")]
    pub primary_threshold: f32,
    /// Used for the second query over secondary hashtags.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f32,
    #[serde(default = "default_true")]
    pub verify_usage: bool,
}

/// Conversation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// Assistant replies starting with one of these are treated as refusals.
    #[serde(default)]
    pub refusal_patterns: Vec<String>,
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            refusal_patterns: Vec::new(),
            history_page_size: default_history_page_size(),
        }
    }
}

/// Top-level configuration (mirrors `duologue.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub inference: InferenceConfig,
    #[serde(default)]
    pub retrieval: Option<RetrievalConfig>,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

impl ClientConfig {
    /// Reject budgets the turn validation could never satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let inference = &self.inference;
        if inference.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "inference.base_url is empty".into(),
            });
        }
        if inference.max_context_tokens == 0 {
            return Err(ConfigError::Invalid {
                reason: "inference.max_context_tokens must be greater than zero".into(),
            });
        }
        if inference.max_output_tokens > inference.max_context_tokens {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "inference.max_output_tokens ({}) exceeds max_context_tokens ({})",
                    inference.max_output_tokens, inference.max_context_tokens
                ),
            });
        }
        if let Some(retrieval) = &self.retrieval {
            for (name, value) in [
                ("primary_threshold", retrieval.primary_threshold),
                ("fallback_threshold", retrieval.fallback_threshold),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::Invalid {
                        reason: format!("retrieval.{name} must be within 0..=1, got {value}"),
                    });
                }
            }
        }
        Ok(())
    }
}

fn default_stream_path() -> String {
    "/api/chat".into()
}
fn default_verify_path() -> String {
    "/api/verify-usage".into()
}
fn default_min_query_chars() -> usize {
    20
}
fn default_max_results() -> u32 {
    2
}
fn default_primary_threshold() -> f32 {
    0.75
}
fn default_fallback_threshold() -> f32 {
    0.6
}
fn default_true() -> bool {
    true
}
fn default_history_page_size() -> u32 {
    20
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `DUOLOGUE_CONFIG` first, then searches upward from `start` for
/// `duologue.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "config path from env does not exist");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound {
        file_name: CONFIG_FILE_NAME.into(),
    })
}

/// Load, interpolate, parse and validate the config file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let config = parse_config(&raw)?;
    tracing::info!(
        path = %path.display(),
        base_url = %config.inference.base_url,
        max_context_tokens = config.inference.max_context_tokens,
        retrieval = config.retrieval.is_some(),
        "config loaded"
    );
    Ok(config)
}

/// Parse config text. `${VAR}` / `${VAR:-default}` are resolved first.
pub fn parse_config(raw: &str) -> Result<ClientConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    let config: ClientConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
