//! Session lifecycle on the orchestrator.
//!
//! Sessions are the store-side identity of a conversation. Without a store
//! they are local records and nothing survives a restart.

use chrono::Utc;
use uuid::Uuid;

use super::orchestrator::GenerationOrchestrator;
use crate::conversation::errors::StoreError;
use crate::conversation::types::{PageRequest, SessionRecord};
use crate::inference::types::Role;

/// What [`GenerationOrchestrator::recover_invalid_state`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub removed_message: bool,
    pub removed_context: bool,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        !self.removed_message && !self.removed_context
    }
}

/// What [`GenerationOrchestrator::load_history`] put into the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadedHistory {
    pub contexts: usize,
    pub messages: usize,
}

impl GenerationOrchestrator {
    pub async fn start_session(&self, character_id: &str) -> Result<SessionRecord, StoreError> {
        let record = match &self.store {
            Some(store) => store.create_session(character_id).await?,
            None => SessionRecord {
                session_id: Uuid::new_v4().to_string(),
                character_id: character_id.to_string(),
                created_at: Utc::now(),
            },
        };
        tracing::info!(
            session_id = %record.session_id,
            character_id = %record.character_id,
            persisted = self.store.is_some(),
            "session started"
        );
        Ok(record)
    }

    /// Cancel any active turn, drop the in-memory history and soft-delete
    /// the stored session.
    pub async fn restart_session(
        &self,
        conversation_id: &str,
        session_id: Option<&str>,
    ) -> Result<(), StoreError> {
        self.cancel_active();
        self.lock_logs().delete_history(conversation_id);
        if let (Some(store), Some(session_id)) = (&self.store, session_id) {
            store.delete_session(session_id).await?;
        }
        Ok(())
    }

    /// Hydrate an empty log from the store: the newest context pairs fitting
    /// `max_tokens` and one page of messages. A log that already holds
    /// anything is left as is.
    pub async fn load_history(
        &self,
        conversation_id: &str,
        session_id: &str,
        max_tokens: u32,
        page: PageRequest,
    ) -> Result<LoadedHistory, StoreError> {
        let Some(store) = &self.store else {
            return Ok(LoadedHistory::default());
        };
        if self.has_resident_history(conversation_id) {
            return Ok(LoadedHistory::default());
        }

        let contexts = store.fetch_context(session_id, max_tokens).await?;
        let messages = store.fetch_messages(session_id, page).await?;

        let mut logs = self.lock_logs();
        if logs.get(conversation_id).is_some_and(|log| !log.is_empty()) {
            tracing::debug!(conversation_id = %conversation_id, "log filled while loading, keeping it");
            return Ok(LoadedHistory::default());
        }
        let loaded_contexts = logs.add_contexts(
            conversation_id,
            contexts
                .into_iter()
                .map(|entry| (Uuid::new_v4().to_string(), entry)),
            true,
        );
        let mut loaded_messages = 0;
        for stored in messages {
            if logs.add_message(conversation_id, stored.id.to_string(), stored.into_message(), true) {
                loaded_messages += 1;
            }
        }

        tracing::info!(
            conversation_id = %conversation_id,
            session_id = %session_id,
            contexts = loaded_contexts,
            messages = loaded_messages,
            "history loaded"
        );
        Ok(LoadedHistory {
            contexts: loaded_contexts,
            messages: loaded_messages,
        })
    }

    /// [`load_history`](Self::load_history) with the context ceiling and the
    /// configured page size.
    pub async fn load_recent_history(
        &self,
        conversation_id: &str,
        session_id: &str,
    ) -> Result<LoadedHistory, StoreError> {
        self.load_history(
            conversation_id,
            session_id,
            self.settings.max_context_tokens,
            PageRequest::first(self.settings.history_page_size),
        )
        .await
    }

    /// Remove what an interrupted turn leaves behind: a trailing message with
    /// no output and no stop reason, and a trailing user context entry that
    /// never got a reply.
    pub fn recover_invalid_state(&self, conversation_id: &str) -> RecoveryReport {
        let mut logs = self.lock_logs();

        let unfinished = logs.get(conversation_id).and_then(|log| {
            let key = log.latest_message_key()?;
            let message = log.get_message(key)?;
            (message.raw_ai.is_empty() && message.stop_reason.is_none()).then(|| key.clone())
        });
        let removed_message = unfinished
            .and_then(|key| logs.delete_message(conversation_id, &key))
            .is_some();

        let removed_context = logs.get_latest_context_role(conversation_id) == Some(Role::User)
            && logs.delete_latest_user_context(conversation_id).is_some();

        let report = RecoveryReport {
            removed_message,
            removed_context,
        };
        if !report.is_clean() {
            tracing::debug!(
                conversation_id = %conversation_id,
                removed_message,
                removed_context,
                "rolled back unfinished turn"
            );
        }
        report
    }

    fn has_resident_history(&self, conversation_id: &str) -> bool {
        self.lock_logs()
            .get(conversation_id)
            .is_some_and(|log| !log.is_empty())
    }
}
