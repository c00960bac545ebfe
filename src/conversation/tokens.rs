//! Token counting for budget checks and context trimming.
//!
//! The default counter is a character heuristic calibrated conservatively
//! (~3.2 bytes per token for prose). A model-specific tokenizer plugs in
//! through [`TokenCounter`].

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average bytes per token for prose. Overestimates on purpose.
const CHARS_PER_TOKEN: f64 = 3.2;

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Public API ─────────────────────────────────────────────────────────────

/// Estimate the token count for natural language text.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.len() as f64;
    (chars / CHARS_PER_TOKEN).ceil() as u32
}

/// Token counting boundary: `count(text) -> tokens`.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u32;
}

/// [`estimate_tokens`] behind the [`TokenCounter`] seam.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> u32 {
        estimate_tokens(text)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
