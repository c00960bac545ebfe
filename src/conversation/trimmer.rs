//! Token-budget eviction policy for the context log.
//!
//! The trimmer is pure: it reads the resident context entries and reports
//! how many of the oldest ones must go. The caller applies the eviction
//! through [`ConversationLog::delete_many_oldest_from_context`] so every drop
//! is a visible log mutation.
//!
//! Policy, in order:
//! 1. No input text, no input surface, or nothing left after filtering is
//!    reported as [`TrimInvalid`].
//! 2. Refusal filtering. An assistant entry whose trimmed content starts
//!    with a configured pattern (optionally behind a leading `*`) is dropped
//!    together with the user entry retained just before it.
//! 3. Budget. Whole user/assistant pairs are dropped from the head while the
//!    filtered sum exceeds the budget. The newest complete pair is never
//!    dropped, even when it alone is over budget.
//!
//! `leftover_count` is expressed in raw log entries: it is the log index of
//! the first surviving entry, so refusals sitting before the cut are evicted
//! along with the pairs that were dropped for budget.
//!
//! [`ConversationLog::delete_many_oldest_from_context`]:
//!     super::log::ConversationLog::delete_many_oldest_from_context

use crate::inference::types::Role;

use super::types::ContextEntry;

/// Leading emphasis marker allowed in front of a refusal pattern.
const EMPHASIS_MARKER: char = '*';

/// Why a trim request produced no usable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimInvalid {
    EmptyInput,
    NoInputSurface,
    /// The log is empty, or every entry was filtered out.
    NoContext,
}

/// Result of [`ContextTrimmer::trim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimOutcome {
    Invalid(TrimInvalid),
    Fitted {
        /// Filtered, budget-fitting history, oldest first.
        contexts: Vec<ContextEntry>,
        /// Oldest raw log entries the caller must evict.
        leftover_count: usize,
    },
}

/// Refusal filter plus pairwise head eviction.
#[derive(Debug, Clone, Default)]
pub struct ContextTrimmer {
    refusal_patterns: Vec<String>,
}

impl ContextTrimmer {
    pub fn new(refusal_patterns: Vec<String>) -> Self {
        let refusal_patterns = refusal_patterns
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { refusal_patterns }
    }

    pub fn refusal_patterns(&self) -> &[String] {
        &self.refusal_patterns
    }

    /// Whether assistant content counts as a refusal.
    pub fn is_refusal(&self, content: &str) -> bool {
        let trimmed = content.trim_start();
        let unmarked = trimmed
            .strip_prefix(EMPHASIS_MARKER)
            .map(str::trim_start)
            .unwrap_or(trimmed);
        self.refusal_patterns
            .iter()
            .any(|p| trimmed.starts_with(p.as_str()) || unmarked.starts_with(p.as_str()))
    }

    /// Compute the history to send and the number of entries to evict.
    pub fn trim<'a, I>(
        &self,
        entries: I,
        input: &str,
        has_input_surface: bool,
        max_tokens: u32,
    ) -> TrimOutcome
    where
        I: IntoIterator<Item = &'a ContextEntry>,
    {
        if input.trim().is_empty() {
            return TrimOutcome::Invalid(TrimInvalid::EmptyInput);
        }
        if !has_input_surface {
            return TrimOutcome::Invalid(TrimInvalid::NoInputSurface);
        }

        // (raw log index, entry)
        let mut kept: Vec<(usize, &ContextEntry)> = Vec::new();
        for (raw_index, entry) in entries.into_iter().enumerate() {
            if entry.role == Role::Assistant && self.is_refusal(&entry.content) {
                if matches!(kept.last(), Some((_, last)) if last.role == Role::User) {
                    kept.pop();
                }
                continue;
            }
            kept.push((raw_index, entry));
        }

        if kept.is_empty() {
            return TrimOutcome::Invalid(TrimInvalid::NoContext);
        }

        let mut total: u64 = kept.iter().map(|(_, e)| u64::from(e.token_count)).sum();
        let budget = u64::from(max_tokens);
        let mut cut = 0;
        while total > budget && kept.len() - cut > 2 {
            total -= kept[cut..cut + 2]
                .iter()
                .map(|(_, e)| u64::from(e.token_count))
                .sum::<u64>();
            cut += 2;
        }

        let leftover_count = if cut == 0 { 0 } else { kept[cut].0 };
        if cut > 0 {
            tracing::debug!(
                dropped_pairs = cut / 2,
                leftover_count,
                remaining_tokens = total,
                max_tokens,
                "context over budget, evicting oldest pairs"
            );
        }

        TrimOutcome::Fitted {
            contexts: kept[cut..].iter().map(|(_, e)| (*e).clone()).collect(),
            leftover_count,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(content: &str, tokens: u32) -> ContextEntry {
        ContextEntry::new(Role::User, content, tokens)
    }

    fn assistant(content: &str, tokens: u32) -> ContextEntry {
        ContextEntry::new(Role::Assistant, content, tokens)
    }

    fn trimmer() -> ContextTrimmer {
        ContextTrimmer::new(vec!["I cannot".to_string()])
    }

    fn fitted(outcome: TrimOutcome) -> (Vec<ContextEntry>, usize) {
        match outcome {
            TrimOutcome::Fitted {
                contexts,
                leftover_count,
            } => (contexts, leftover_count),
            other => panic!("expected fitted outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_refusal_pair_is_filtered() {
        let log = vec![
            user("hi", 1),
            assistant("I cannot help with that", 6),
            user("ok", 1),
            assistant("sure, here's info", 5),
        ];
        let (contexts, leftover) = fitted(trimmer().trim(&log, "next", true, 1000));
        assert_eq!(
            contexts,
            vec![user("ok", 1), assistant("sure, here's info", 5)]
        );
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_refusal_with_emphasis_marker() {
        let t = trimmer();
        assert!(t.is_refusal("*I cannot do that*"));
        assert!(t.is_refusal("  * I cannot do that"));
        assert!(t.is_refusal("I cannot"));
        assert!(!t.is_refusal("Well, I cannot say"));
        assert!(!ContextTrimmer::default().is_refusal("I cannot"));
    }

    #[test]
    fn test_budget_evicts_oldest_pair() {
        let log = vec![
            user("a", 50),
            assistant("b", 50),
            user("c", 50),
            assistant("d", 50),
        ];
        let (contexts, leftover) = fitted(trimmer().trim(&log, "q", true, 80));
        assert_eq!(leftover, 2);
        assert_eq!(contexts, vec![user("c", 50), assistant("d", 50)]);
    }

    #[test]
    fn test_budget_drops_until_fit() {
        let log = vec![
            user("a", 10),
            assistant("b", 10),
            user("c", 10),
            assistant("d", 10),
            user("e", 10),
            assistant("f", 10),
        ];
        let (contexts, leftover) = fitted(trimmer().trim(&log, "q", true, 40));
        assert_eq!(leftover, 2);
        assert_eq!(contexts.len(), 4);
    }

    #[test]
    fn test_leftover_counts_refusals_before_cut() {
        let log = vec![
            user("hi", 10),
            assistant("I cannot", 10),
            user("a", 50),
            assistant("b", 50),
            user("c", 50),
            assistant("d", 50),
        ];
        let (contexts, leftover) = fitted(trimmer().trim(&log, "q", true, 120));
        assert_eq!(leftover, 4);
        assert_eq!(contexts, vec![user("c", 50), assistant("d", 50)]);
    }

    #[test]
    fn test_invalid_inputs() {
        let log = vec![user("a", 1), assistant("b", 1)];
        let t = trimmer();
        assert_eq!(
            t.trim(&log, "   ", true, 100),
            TrimOutcome::Invalid(TrimInvalid::EmptyInput)
        );
        assert_eq!(
            t.trim(&log, "q", false, 100),
            TrimOutcome::Invalid(TrimInvalid::NoInputSurface)
        );
        assert_eq!(
            t.trim(&Vec::<ContextEntry>::new(), "q", true, 100),
            TrimOutcome::Invalid(TrimInvalid::NoContext)
        );
    }

    #[test]
    fn test_only_refusals_is_no_context() {
        let log = vec![user("hi", 1), assistant("I cannot", 1)];
        assert_eq!(
            trimmer().trim(&log, "q", true, 100),
            TrimOutcome::Invalid(TrimInvalid::NoContext)
        );
    }

    proptest! {
        /// Alternating logs with random sizes and refusals: eviction always
        /// lands on a pair boundary and the result fits unless only the
        /// newest pair is left.
        #[test]
        fn prop_eviction_keeps_pairs(
            pairs in prop::collection::vec((1u32..200, 1u32..200, any::<bool>()), 0..12),
            max_tokens in 0u32..1000,
        ) {
            let mut log = Vec::new();
            for (u, a, refusal) in &pairs {
                log.push(user("question", *u));
                let reply = if *refusal { "I cannot answer" } else { "answer" };
                log.push(assistant(reply, *a));
            }

            match trimmer().trim(&log, "q", true, max_tokens) {
                TrimOutcome::Invalid(reason) => {
                    prop_assert_eq!(reason, TrimInvalid::NoContext);
                    prop_assert!(pairs.iter().all(|(_, _, refusal)| *refusal));
                }
                TrimOutcome::Fitted { contexts, leftover_count } => {
                    prop_assert_eq!(leftover_count % 2, 0);
                    prop_assert!(leftover_count <= log.len());
                    prop_assert_eq!(contexts.len() % 2, 0);
                    prop_assert!(!contexts.is_empty());
                    for pair in contexts.chunks(2) {
                        prop_assert_eq!(pair[0].role, Role::User);
                        prop_assert_eq!(pair[1].role, Role::Assistant);
                    }
                    let sum: u64 = contexts.iter().map(|e| u64::from(e.token_count)).sum();
                    prop_assert!(sum <= u64::from(max_tokens) || contexts.len() == 2);

                    // Evicting leftover_count raw entries leaves an even log
                    prop_assert_eq!((log.len() - leftover_count) % 2, 0);
                }
            }
        }
    }
}
