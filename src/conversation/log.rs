//! Per-conversation context and message logs.
//!
//! A [`ConversationLog`] owns two [`OrderedKeyedList`]s: the context entries
//! sent to the model and the messages shown to the user. It maintains the
//! context token sum incrementally; only [`ConversationLog::audit_token_sum`]
//! recomputes it by scanning.
//!
//! [`ConversationLogs`] is the registry keyed by conversation id. Logs are
//! created lazily on first write and destroyed only by an explicit
//! [`ConversationLogs::delete_history`].
//!
//! Every delete on an empty log or a missing key is a silent no-op.

use std::collections::HashMap;

use crate::collections::OrderedKeyedList;
use crate::inference::types::Role;

use super::trimmer::{ContextTrimmer, TrimInvalid, TrimOutcome};
use super::types::{ContextEntry, Message};

// ─── ConversationLog ────────────────────────────────────────────────────────

/// Context and message logs for one conversation.
#[derive(Debug, Default)]
pub struct ConversationLog {
    contexts: OrderedKeyedList<String, ContextEntry>,
    messages: OrderedKeyedList<String, Message>,
    total_context_tokens: u64,
    next_position: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn total_context_tokens(&self) -> u64 {
        self.total_context_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty() && self.messages.is_empty()
    }

    // ─── Context ────────────────────────────────────────────────────────

    /// Append (or prepend) a context entry. Duplicate keys are ignored.
    pub fn add_context(&mut self, key: impl Into<String>, entry: ContextEntry, at_end: bool) -> bool {
        let tokens = u64::from(entry.token_count);
        let inserted = if at_end {
            self.contexts.push_end(key.into(), entry)
        } else {
            self.contexts.push_front(key.into(), entry)
        };
        if inserted {
            self.total_context_tokens += tokens;
        }
        inserted
    }

    /// Bulk [`add_context`](Self::add_context). Batch order is preserved at
    /// either end. Returns the number of entries inserted.
    pub fn add_contexts<I>(&mut self, items: I, at_end: bool) -> usize
    where
        I: IntoIterator<Item = (String, ContextEntry)>,
    {
        let items: Vec<(String, ContextEntry)> = items.into_iter().collect();
        let mut inserted = 0;
        if at_end {
            for (key, entry) in items {
                if self.add_context(key, entry, true) {
                    inserted += 1;
                }
            }
        } else {
            for (key, entry) in items.into_iter().rev() {
                if self.add_context(key, entry, false) {
                    inserted += 1;
                }
            }
        }
        inserted
    }

    pub fn delete_oldest_from_context(&mut self) -> Option<ContextEntry> {
        let entry = self.contexts.remove_first()?;
        self.total_context_tokens = self
            .total_context_tokens
            .saturating_sub(u64::from(entry.token_count));
        Some(entry)
    }

    /// Drop up to `n` head entries. Clamped to the resident count.
    pub fn delete_many_oldest_from_context(&mut self, n: usize) -> usize {
        let n = n.min(self.contexts.len());
        for _ in 0..n {
            self.delete_oldest_from_context();
        }
        n
    }

    pub fn delete_latest_context(&mut self) -> Option<ContextEntry> {
        let entry = self.contexts.remove_last()?;
        self.total_context_tokens = self
            .total_context_tokens
            .saturating_sub(u64::from(entry.token_count));
        Some(entry)
    }

    /// Roll back a dangling user entry. Leaves the log untouched when the
    /// tail is an assistant entry.
    pub fn delete_latest_user_context(&mut self) -> Option<ContextEntry> {
        if self.latest_context_role()? != Role::User {
            return None;
        }
        self.delete_latest_context()
    }

    pub fn latest_context_role(&self) -> Option<Role> {
        self.contexts.last().map(|e| e.role)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ContextEntry> {
        self.contexts.values()
    }

    pub fn context_ids(&self) -> Vec<String> {
        self.contexts.ids()
    }

    pub fn context_vec(&self) -> Vec<ContextEntry> {
        self.contexts.to_vec()
    }

    // ─── Messages ───────────────────────────────────────────────────────

    /// Add a message and stamp it with the next position.
    pub fn add_message(&mut self, key: impl Into<String>, mut message: Message, at_end: bool) -> bool {
        let key = key.into();
        if self.messages.has(&key) {
            return false;
        }
        message.position = self.next_position;
        let inserted = if at_end {
            self.messages.push_end(key, message)
        } else {
            self.messages.push_front(key, message)
        };
        if inserted {
            self.next_position += 1;
        }
        inserted
    }

    /// Replace a message wholesale. Its position is kept.
    pub fn update_message(&mut self, key: &str, mut message: Message) -> bool {
        let Some(existing) = self.messages.get(&key.to_string()) else {
            return false;
        };
        message.position = existing.position;
        self.messages.update(&key.to_string(), message)
    }

    pub fn get_message(&self, key: &str) -> Option<&Message> {
        self.messages.get(&key.to_string())
    }

    pub fn delete_latest_message(&mut self) -> Option<Message> {
        self.messages.remove_last()
    }

    pub fn delete_message(&mut self, key: &str) -> Option<Message> {
        self.messages.delete(&key.to_string())
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn message_vec(&self) -> Vec<Message> {
        self.messages.to_vec()
    }

    /// Messages in `[start, end)`, clamped.
    pub fn message_range(&self, start: usize, end: usize) -> Vec<Message> {
        self.messages.get_range(start, end)
    }

    pub fn latest_message_key(&self) -> Option<&String> {
        self.messages.last_key()
    }

    // ─── Trimming / audit ───────────────────────────────────────────────

    pub fn contexts_with_deletable_entries(
        &self,
        trimmer: &ContextTrimmer,
        input: &str,
        has_input_surface: bool,
        max_tokens: u32,
    ) -> TrimOutcome {
        trimmer.trim(self.contexts.values(), input, has_input_surface, max_tokens)
    }

    /// Recompute the token sum by full scan.
    pub fn audit_token_sum(&self) -> u64 {
        self.contexts
            .values()
            .map(|e| u64::from(e.token_count))
            .sum()
    }

    /// Empty both logs. Positions keep counting up.
    fn clear(&mut self) {
        self.contexts.clear();
        self.messages.clear();
        self.total_context_tokens = 0;
    }
}

// ─── ConversationLogs ───────────────────────────────────────────────────────

/// Registry of logs keyed by conversation id.
#[derive(Debug, Default)]
pub struct ConversationLogs {
    logs: HashMap<String, ConversationLog>,
}

impl ConversationLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ConversationLog> {
        self.logs.get(id)
    }

    /// The log for `id`, created on first use.
    pub fn get_or_create(&mut self, id: &str) -> &mut ConversationLog {
        self.logs.entry(id.to_string()).or_default()
    }

    pub fn get_message_count(&self, id: &str) -> usize {
        self.logs.get(id).map_or(0, ConversationLog::message_count)
    }

    pub fn get_context_count(&self, id: &str) -> usize {
        self.logs.get(id).map_or(0, ConversationLog::context_count)
    }

    pub fn total_context_tokens(&self, id: &str) -> u64 {
        self.logs.get(id).map_or(0, ConversationLog::total_context_tokens)
    }

    pub fn add_context(&mut self, id: &str, key: impl Into<String>, entry: ContextEntry, at_end: bool) -> bool {
        self.get_or_create(id).add_context(key, entry, at_end)
    }

    pub fn add_contexts<I>(&mut self, id: &str, items: I, at_end: bool) -> usize
    where
        I: IntoIterator<Item = (String, ContextEntry)>,
    {
        self.get_or_create(id).add_contexts(items, at_end)
    }

    pub fn delete_oldest_from_context(&mut self, id: &str) -> Option<ContextEntry> {
        self.logs.get_mut(id)?.delete_oldest_from_context()
    }

    pub fn delete_many_oldest_from_context(&mut self, id: &str, n: usize) -> usize {
        self.logs
            .get_mut(id)
            .map_or(0, |log| log.delete_many_oldest_from_context(n))
    }

    pub fn delete_latest_context(&mut self, id: &str) -> Option<ContextEntry> {
        self.logs.get_mut(id)?.delete_latest_context()
    }

    pub fn delete_latest_user_context(&mut self, id: &str) -> Option<ContextEntry> {
        self.logs.get_mut(id)?.delete_latest_user_context()
    }

    pub fn get_latest_context_role(&self, id: &str) -> Option<Role> {
        self.logs.get(id)?.latest_context_role()
    }

    pub fn add_message(&mut self, id: &str, key: impl Into<String>, message: Message, at_end: bool) -> bool {
        self.get_or_create(id).add_message(key, message, at_end)
    }

    pub fn update_message(&mut self, id: &str, key: &str, message: Message) -> bool {
        self.logs
            .get_mut(id)
            .is_some_and(|log| log.update_message(key, message))
    }

    pub fn delete_latest_message(&mut self, id: &str) -> Option<Message> {
        self.logs.get_mut(id)?.delete_latest_message()
    }

    pub fn delete_message(&mut self, id: &str, key: &str) -> Option<Message> {
        self.logs.get_mut(id)?.delete_message(key)
    }

    /// Trim the history of `id` against `max_tokens`. A missing log behaves
    /// like an empty one.
    pub fn get_contexts_with_deletable_entries(
        &self,
        id: &str,
        trimmer: &ContextTrimmer,
        input: &str,
        has_input_surface: bool,
        max_tokens: u32,
    ) -> TrimOutcome {
        match self.logs.get(id) {
            Some(log) => log.contexts_with_deletable_entries(trimmer, input, has_input_surface, max_tokens),
            None => match trimmer.trim(std::iter::empty::<&ContextEntry>(), input, has_input_surface, max_tokens) {
                TrimOutcome::Invalid(reason) => TrimOutcome::Invalid(reason),
                TrimOutcome::Fitted { .. } => TrimOutcome::Invalid(TrimInvalid::NoContext),
            },
        }
    }

    pub fn audit_token_sum(&self, id: &str) -> Option<u64> {
        self.logs.get(id).map(ConversationLog::audit_token_sum)
    }

    /// Destroy the log for `id`. Returns whether anything was resident.
    pub fn delete_history(&mut self, id: &str) -> bool {
        match self.logs.remove(id) {
            Some(mut log) => {
                let had_entries = !log.is_empty();
                tracing::info!(
                    conversation_id = %id,
                    contexts = log.context_count(),
                    messages = log.message_count(),
                    "conversation history deleted"
                );
                log.clear();
                had_entries
            }
            None => false,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ID: &str = "conv-1";

    fn user(tokens: u32) -> ContextEntry {
        ContextEntry::new(Role::User, "q", tokens)
    }

    fn assistant(tokens: u32) -> ContextEntry {
        ContextEntry::new(Role::Assistant, "a", tokens)
    }

    #[test]
    fn test_counts_start_at_zero() {
        let logs = ConversationLogs::new();
        assert_eq!(logs.get_message_count(ID), 0);
        assert_eq!(logs.get_context_count(ID), 0);
        assert!(logs.get(ID).is_none());
    }

    #[test]
    fn test_add_context_tracks_tokens() {
        let mut logs = ConversationLogs::new();
        assert!(logs.add_context(ID, "c1", user(10), true));
        assert!(logs.add_context(ID, "c2", assistant(15), true));
        assert!(!logs.add_context(ID, "c2", assistant(99), true), "duplicate ignored");
        assert_eq!(logs.get_context_count(ID), 2);
        assert_eq!(logs.total_context_tokens(ID), 25);
        assert_eq!(logs.get_latest_context_role(ID), Some(Role::Assistant));
    }

    #[test]
    fn test_bulk_add_keeps_order_at_front() {
        let mut log = ConversationLog::new();
        log.add_context("c3", user(1), true);
        let added = log.add_contexts(
            vec![("c1".to_string(), user(1)), ("c2".to_string(), assistant(1))],
            false,
        );
        assert_eq!(added, 2);
        assert_eq!(log.context_ids(), vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_delete_oldest_and_many_clamped() {
        let mut logs = ConversationLogs::new();
        logs.add_context(ID, "c1", user(10), true);
        logs.add_context(ID, "c2", assistant(20), true);
        logs.add_context(ID, "c3", user(30), true);

        assert_eq!(logs.delete_oldest_from_context(ID), Some(user(10)));
        assert_eq!(logs.total_context_tokens(ID), 50);

        assert_eq!(logs.delete_many_oldest_from_context(ID, 10), 2);
        assert_eq!(logs.get_context_count(ID), 0);
        assert_eq!(logs.total_context_tokens(ID), 0);

        // No-ops on empty and unknown logs
        assert!(logs.delete_oldest_from_context(ID).is_none());
        assert_eq!(logs.delete_many_oldest_from_context("missing", 3), 0);
        assert!(logs.delete_latest_context("missing").is_none());
    }

    #[test]
    fn test_delete_latest_user_context_only_pops_user() {
        let mut log = ConversationLog::new();
        log.add_context("c1", user(5), true);
        log.add_context("c2", assistant(5), true);
        assert!(log.delete_latest_user_context().is_none());
        assert_eq!(log.context_count(), 2);

        log.add_context("c3", user(7), true);
        assert_eq!(log.delete_latest_user_context(), Some(user(7)));
        assert_eq!(log.total_context_tokens(), 10);
    }

    #[test]
    fn test_message_positions_increase_and_survive_update() {
        let mut logs = ConversationLogs::new();
        logs.add_message(ID, "m1", Message::pending("a", 1, "m"), true);
        logs.add_message(ID, "m2", Message::pending("b", 1, "m"), true);
        logs.delete_latest_message(ID);
        logs.add_message(ID, "m3", Message::pending("c", 1, "m"), true);

        let log = logs.get(ID).unwrap();
        let positions: Vec<u64> = log.messages().map(|m| m.position).collect();
        assert_eq!(positions, vec![0, 2], "positions are never reused");

        let mut updated = Message::pending("c", 1, "m");
        updated.raw_ai = "reply".to_string();
        assert!(logs.update_message(ID, "m3", updated));
        let m3 = logs.get(ID).unwrap().get_message("m3").unwrap();
        assert_eq!(m3.raw_ai, "reply");
        assert_eq!(m3.position, 2);

        assert!(!logs.update_message(ID, "missing", Message::pending("x", 1, "m")));
    }

    #[test]
    fn test_delete_history_is_explicit() {
        let mut logs = ConversationLogs::new();
        logs.add_context(ID, "c1", user(1), true);
        logs.add_message(ID, "m1", Message::pending("a", 1, "m"), true);
        assert!(logs.delete_history(ID));
        assert!(logs.get(ID).is_none());
        assert!(!logs.delete_history(ID));
    }

    #[test]
    fn test_deletable_entries_for_missing_log() {
        let logs = ConversationLogs::new();
        let trimmer = ContextTrimmer::default();
        assert_eq!(
            logs.get_contexts_with_deletable_entries(ID, &trimmer, "hello", true, 100),
            TrimOutcome::Invalid(TrimInvalid::NoContext)
        );
        assert_eq!(
            logs.get_contexts_with_deletable_entries(ID, &trimmer, "", true, 100),
            TrimOutcome::Invalid(TrimInvalid::EmptyInput)
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u32, bool),
        DeleteOldest,
        DeleteMany(usize),
        DeleteLatest,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0u32..500, any::<bool>()).prop_map(|(t, end)| Op::Add(t, end)),
            1 => Just(Op::DeleteOldest),
            1 => (0usize..6).prop_map(Op::DeleteMany),
            1 => Just(Op::DeleteLatest),
        ]
    }

    proptest! {
        #[test]
        fn prop_token_sum_matches_resident_entries(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let mut log = ConversationLog::new();
            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Add(tokens, at_end) => {
                        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                        log.add_context(format!("c{i}"), ContextEntry::new(role, "x", tokens), at_end);
                    }
                    Op::DeleteOldest => { log.delete_oldest_from_context(); }
                    Op::DeleteMany(n) => { log.delete_many_oldest_from_context(n); }
                    Op::DeleteLatest => { log.delete_latest_context(); }
                }
                prop_assert_eq!(log.total_context_tokens(), log.audit_token_sum());
            }
        }
    }
}
