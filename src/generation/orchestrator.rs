//! Turn orchestrator: validate -> evict -> (retrieve -> verify)? -> generate.
//!
//! One turn at a time across the whole client ([`TurnGate`]). The logs are
//! behind a std mutex that is only ever held for short synchronous sections,
//! never across an await. Suspension points are exactly the retrieval call,
//! the verification call and the stream reads; each one races the turn's
//! cancellation token.
//!
//! Exit paths and what they leave behind:
//! - content produced (finish / cancel / error): message finalized, assistant
//!   context appended, message persisted; an error is also reported
//! - zero content (stream_empty / cancel / error): message and user context
//!   rolled back; the finalized message is still reported
//! - retrieval abort: rolled back silently
//! - retrieval failure: rolled back, error reported

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::boundaries::{InferenceBackend, MessageStore, Retriever, TokenCounter, UsageVerifier};
use super::errors::{GenerationError, TransportError, ValidationError};
use super::events::{EventReceiver, EventSink, GenerationEvent};
use super::phase::{TurnGate, TurnGuard, TurnPhase};
use crate::config::{ClientConfig, RetrievalConfig};
use crate::conversation::errors::DataIntegrityError;
use crate::conversation::log::ConversationLogs;
use crate::conversation::tokens::{truncate_utf8, HeuristicTokenCounter};
use crate::conversation::translations::TranslationSet;
use crate::conversation::trimmer::{ContextTrimmer, TrimInvalid, TrimOutcome};
use crate::conversation::types::{ContextEntry, Message, StopReason};
use crate::inference::client::InferenceClient;
use crate::inference::retrieval::{RetrievalClient, RetrievalError, RetrievalQuery, RetrievedFragment};
use crate::inference::types::{ChatMessage, GenerationRequest, Role};

/// Max bytes of user input echoed into logs.
const LOG_PREVIEW_BYTES: usize = 80;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Budgets and policy for every turn.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    /// `None` disables retrieval.
    pub retrieval: Option<RetrievalConfig>,
    pub refusal_patterns: Vec<String>,
    /// Messages hydrated by [`GenerationOrchestrator::load_recent_history`].
    pub history_page_size: u32,
}

impl GenerationSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_context_tokens: config.inference.max_context_tokens,
            max_output_tokens: config.inference.max_output_tokens,
            retrieval: config.retrieval.clone(),
            refusal_patterns: config.conversation.refusal_patterns.clone(),
            history_page_size: config.conversation.history_page_size,
        }
    }
}

/// One user submission.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    /// Store session to persist into. `None` keeps the turn in memory only.
    pub session_id: Option<String>,
    pub character_id: String,
    pub input: String,
    pub language_code: String,
    /// Whether an editor / log surface is attached to receive the turn.
    pub has_input_surface: bool,
    pub hashtags: Vec<String>,
    pub secondary_hashtags: Vec<String>,
    pub user_id: Option<String>,
}

impl TurnRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        character_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            session_id: None,
            character_id: character_id.into(),
            input: input.into(),
            language_code: "en".to_string(),
            has_input_surface: true,
            hashtags: Vec::new(),
            secondary_hashtags: Vec::new(),
            user_id: None,
        }
    }
}

/// How a turn ended. Transport failures and aborts land here, not in `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The message and its context pair stay in the log (finish, cancel or
    /// error after content).
    Kept { message_key: String, message: Message },
    /// Zero content; the turn was rolled back. Reported, not stored.
    RolledBack { message: Message },
    /// Cancelled before generation started.
    Aborted,
    /// Retrieval failed; the turn was rolled back.
    Failed { notice: String },
}

impl TurnOutcome {
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            TurnOutcome::Kept { message, .. } | TurnOutcome::RolledBack { message } => {
                message.stop_reason
            }
            TurnOutcome::Aborted | TurnOutcome::Failed { .. } => None,
        }
    }
}

struct PreparedTurn {
    history: Vec<ChatMessage>,
    message_key: String,
    message: Message,
}

enum RetrievalStep {
    Skipped,
    Found {
        relevant: Vec<String>,
        sources: Vec<String>,
        content_ids: Vec<String>,
    },
    Aborted,
    Failed(TransportError),
}

enum StreamEnd {
    Closed,
    Cancelled,
    Failed(TransportError),
}

// ─── GenerationOrchestrator ─────────────────────────────────────────────────

pub struct GenerationOrchestrator {
    pub(super) backend: Arc<dyn InferenceBackend>,
    pub(super) retriever: Option<Arc<dyn Retriever>>,
    pub(super) verifier: Option<Arc<dyn UsageVerifier>>,
    pub(super) store: Option<Arc<dyn MessageStore>>,
    pub(super) tokens: Arc<dyn TokenCounter>,
    pub(super) trimmer: ContextTrimmer,
    pub(super) settings: GenerationSettings,
    pub(super) prompts: RwLock<HashMap<String, TranslationSet>>,
    pub(super) logs: Mutex<ConversationLogs>,
    pub(super) gate: TurnGate,
    pub(super) events: EventSink,
}

impl GenerationOrchestrator {
    /// Create an orchestrator and the receiver for its events.
    ///
    /// The channel is unbounded and every `Content` event carries the full
    /// text so far. Keep draining the receiver, or drop it if events are not
    /// wanted.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        tokens: Arc<dyn TokenCounter>,
        settings: GenerationSettings,
    ) -> (Self, EventReceiver) {
        let (events, rx) = EventSink::channel();
        let orchestrator = Self {
            backend,
            retriever: None,
            verifier: None,
            store: None,
            tokens,
            trimmer: ContextTrimmer::new(settings.refusal_patterns.clone()),
            settings,
            prompts: RwLock::new(HashMap::new()),
            logs: Mutex::new(ConversationLogs::new()),
            gate: TurnGate::new(),
            events,
        };
        (orchestrator, rx)
    }

    /// Wire the HTTP clients from config.
    pub fn from_config(
        config: &ClientConfig,
        store: Option<Arc<dyn MessageStore>>,
    ) -> Result<(Self, EventReceiver), TransportError> {
        let client = Arc::new(InferenceClient::from_config(&config.inference)?);
        let (mut orchestrator, rx) = Self::new(
            client.clone(),
            Arc::new(HeuristicTokenCounter),
            GenerationSettings::from_config(config),
        );
        if let Some(retrieval) = &config.retrieval {
            orchestrator.retriever = Some(Arc::new(RetrievalClient::from_config(retrieval)?));
            if retrieval.verify_usage {
                orchestrator.verifier = Some(client);
            }
        }
        orchestrator.store = store;
        Ok((orchestrator, rx))
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn UsageVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register (or replace) a character's system prompt translations.
    pub fn register_prompts(&self, prompts: TranslationSet) {
        let mut map = self.prompts.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(prompts.owner().to_string(), prompts);
    }

    // ─── Read-only projections ──────────────────────────────────────────

    pub fn phase(&self) -> TurnPhase {
        self.gate.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.phase().is_active()
    }

    /// Cancel the in-flight turn, if any.
    pub fn cancel_active(&self) -> bool {
        self.gate.cancel_active()
    }

    /// Run `f` against the logs. Do not call back into the orchestrator.
    pub fn with_logs<R>(&self, f: impl FnOnce(&ConversationLogs) -> R) -> R {
        f(&self.lock_logs())
    }

    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.lock_logs().get_message_count(conversation_id)
    }

    pub fn context_count(&self, conversation_id: &str) -> usize {
        self.lock_logs().get_context_count(conversation_id)
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.lock_logs()
            .get(conversation_id)
            .map(|log| log.message_vec())
            .unwrap_or_default()
    }

    pub fn contexts(&self, conversation_id: &str) -> Vec<ContextEntry> {
        self.lock_logs()
            .get(conversation_id)
            .map(|log| log.context_vec())
            .unwrap_or_default()
    }

    pub(super) fn lock_logs(&self) -> MutexGuard<'_, ConversationLogs> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Turn ───────────────────────────────────────────────────────────

    /// Run one turn to completion.
    ///
    /// Returns `Err` only when the turn never started: another turn is in
    /// flight, the input is invalid, or the character's system prompt is
    /// missing for the requested language.
    pub async fn send_turn(&self, request: TurnRequest) -> Result<TurnOutcome, GenerationError> {
        let Some(guard) = self.gate.try_begin() else {
            tracing::debug!(conversation_id = %request.conversation_id, "turn rejected: busy");
            return Err(GenerationError::Busy);
        };

        let system_prompt = self.system_prompt(&request.character_id, &request.language_code)?;
        let prepared = self.prepare(&request)?;

        self.set_phase(&guard, TurnPhase::Preparing);
        self.events.emit(GenerationEvent::Started {
            conversation_id: request.conversation_id.clone(),
            message_key: prepared.message_key.clone(),
        });

        let outcome = self.run_turn(&guard, &request, system_prompt, prepared).await;

        drop(guard);
        self.events.emit(GenerationEvent::PhaseChanged {
            phase: TurnPhase::Idle,
        });
        Ok(outcome)
    }

    fn system_prompt(&self, character_id: &str, language: &str) -> Result<String, DataIntegrityError> {
        let prompts = self.prompts.read().unwrap_or_else(PoisonError::into_inner);
        let set = prompts
            .get(character_id)
            .ok_or_else(|| DataIntegrityError::MissingTranslation {
                owner: character_id.to_string(),
                language: language.to_string(),
            })?;
        Ok(set.require(language)?.to_string())
    }

    /// Validate, evict, then append the user entry and the pending message.
    fn prepare(&self, request: &TurnRequest) -> Result<PreparedTurn, ValidationError> {
        let input = request.input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        if !request.has_input_surface {
            return Err(ValidationError::NoInputSurface);
        }
        let input_tokens = self.tokens.count(input);
        let limit = self.settings.max_context_tokens;
        if input_tokens > limit {
            return Err(ValidationError::InputExceedsBudget {
                used: input_tokens,
                limit,
            });
        }
        let budget = limit - input_tokens;
        let conversation_id = request.conversation_id.as_str();

        let mut logs = self.lock_logs();
        let history = match logs.get_contexts_with_deletable_entries(
            conversation_id,
            &self.trimmer,
            input,
            request.has_input_surface,
            budget,
        ) {
            TrimOutcome::Fitted {
                contexts,
                leftover_count,
            } => {
                if leftover_count > 0 {
                    let evicted = logs.delete_many_oldest_from_context(conversation_id, leftover_count);
                    tracing::info!(
                        conversation_id = %conversation_id,
                        evicted,
                        budget,
                        remaining_tokens = logs.total_context_tokens(conversation_id),
                        "evicted oldest context entries"
                    );
                }
                contexts
            }
            TrimOutcome::Invalid(TrimInvalid::NoContext) => Vec::new(),
            TrimOutcome::Invalid(TrimInvalid::EmptyInput) => return Err(ValidationError::EmptyInput),
            TrimOutcome::Invalid(TrimInvalid::NoInputSurface) => {
                return Err(ValidationError::NoInputSurface)
            }
        };
        let history = cap_history(history, budget);

        let message_key = Uuid::new_v4().to_string();
        let pending = Message::pending(input, input_tokens, self.backend.model_name());
        logs.add_context(
            conversation_id,
            Uuid::new_v4().to_string(),
            ContextEntry::new(Role::User, input, input_tokens),
            true,
        );
        logs.add_message(conversation_id, message_key.clone(), pending.clone(), true);
        let position = logs
            .get(conversation_id)
            .and_then(|log| log.get_message(&message_key))
            .map(|m| m.position)
            .unwrap_or_default();

        tracing::info!(
            conversation_id = %conversation_id,
            input_tokens,
            history_entries = history.len(),
            input_preview = %truncate_utf8(input, LOG_PREVIEW_BYTES),
            "turn started"
        );

        Ok(PreparedTurn {
            history: history.iter().map(ContextEntry::to_chat_message).collect(),
            message_key,
            message: Message { position, ..pending },
        })
    }

    async fn run_turn(
        &self,
        guard: &TurnGuard,
        request: &TurnRequest,
        system_prompt: String,
        prepared: PreparedTurn,
    ) -> TurnOutcome {
        let conversation_id = request.conversation_id.as_str();
        let PreparedTurn {
            history,
            message_key,
            mut message,
        } = prepared;

        match self.retrieval_phase(guard, request).await {
            RetrievalStep::Skipped => {}
            RetrievalStep::Found {
                relevant,
                sources,
                content_ids,
            } => {
                message.relevant_content = Some(relevant.clone());
                message.sources = sources.clone();
                message.content_ids = content_ids.clone();
                self.lock_logs()
                    .update_message(conversation_id, &message_key, message.clone());
                self.events.emit(GenerationEvent::Retrieved {
                    conversation_id: conversation_id.to_string(),
                    message_key: message_key.clone(),
                    relevant_content: relevant,
                    sources,
                    content_ids,
                });
            }
            RetrievalStep::Aborted => {
                self.recover_invalid_state(conversation_id);
                tracing::info!(conversation_id = %conversation_id, "turn aborted during retrieval");
                return TurnOutcome::Aborted;
            }
            RetrievalStep::Failed(err) => {
                self.recover_invalid_state(conversation_id);
                self.report_error(conversation_id, &err);
                return TurnOutcome::Failed {
                    notice: err.user_notice(),
                };
            }
        }

        let mut messages = history;
        messages.push(ChatMessage::user(request.input.trim()));
        let generation = GenerationRequest {
            system_prompt: compose_system_prompt(&system_prompt, message.relevant_content.as_deref()),
            messages,
            max_tokens: self.settings.max_output_tokens,
            stream: true,
            model: None,
        };

        self.set_phase(guard, TurnPhase::Generating);
        let end = self
            .stream_phase(guard.token(), conversation_id, &message_key, &mut message, generation)
            .await;
        self.finalize(request, message_key, message, end).await
    }

    // ─── Retrieval ──────────────────────────────────────────────────────

    async fn retrieval_phase(&self, guard: &TurnGuard, request: &TurnRequest) -> RetrievalStep {
        let (Some(retriever), Some(settings)) = (&self.retriever, &self.settings.retrieval) else {
            return RetrievalStep::Skipped;
        };
        let input = request.input.trim();
        if !should_perform_rag(input, settings.min_query_chars) {
            return RetrievalStep::Skipped;
        }

        self.set_phase(guard, TurnPhase::Retrieving);
        let token = guard.token();
        let found = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            found = query_with_fallback(retriever.as_ref(), request, settings) => Some(found),
        };
        let fragments = match found {
            None => return RetrievalStep::Aborted,
            Some(Err(e)) => return RetrievalStep::Failed(e.into()),
            Some(Ok(fragments)) => fragments,
        };
        if fragments.is_empty() {
            tracing::debug!(conversation_id = %request.conversation_id, "retrieval found nothing");
            return RetrievalStep::Skipped;
        }

        let relevant: Vec<String> = fragments.iter().map(|f| f.content.clone()).collect();
        let sources: Vec<String> = fragments.iter().filter_map(|f| f.source_url.clone()).collect();
        let content_ids: Vec<String> = fragments.iter().filter_map(|f| f.content_id.clone()).collect();

        if settings.verify_usage {
            if let Some(verifier) = &self.verifier {
                self.set_phase(guard, TurnPhase::VerifyingUsage);
                let verdict = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    verdict = verifier.verify_usage(input, &relevant) => Some(verdict),
                };
                match verdict {
                    None => return RetrievalStep::Aborted,
                    Some(Ok(true)) => {}
                    Some(Ok(false)) => {
                        tracing::debug!(
                            conversation_id = %request.conversation_id,
                            fragments = relevant.len(),
                            "retrieved content not relevant, dropped"
                        );
                        return RetrievalStep::Skipped;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            conversation_id = %request.conversation_id,
                            error = %e,
                            "usage verification failed, dropping retrieved content"
                        );
                        return RetrievalStep::Skipped;
                    }
                }
            }
        }

        tracing::info!(
            conversation_id = %request.conversation_id,
            fragments = relevant.len(),
            sources = sources.len(),
            "retrieved content attached"
        );
        RetrievalStep::Found {
            relevant,
            sources,
            content_ids,
        }
    }

    // ─── Generation ─────────────────────────────────────────────────────

    /// Stream into `message.raw_ai`, replacing the logged message wholesale
    /// after every chunk.
    async fn stream_phase(
        &self,
        token: &CancellationToken,
        conversation_id: &str,
        message_key: &str,
        message: &mut Message,
        request: GenerationRequest,
    ) -> StreamEnd {
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            opened = self.backend.open_stream(request) => Some(opened),
        };
        let mut stream = match opened {
            None => return StreamEnd::Cancelled,
            Some(Err(e)) => return StreamEnd::Failed(e.into()),
            Some(Ok(stream)) => stream,
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = stream.next() => Some(item),
            };
            match item {
                None => return StreamEnd::Cancelled,
                Some(None) => return StreamEnd::Closed,
                Some(Some(Err(e))) => return StreamEnd::Failed(e.into()),
                Some(Some(Ok(delta))) => {
                    if delta.is_empty() {
                        continue;
                    }
                    message.raw_ai.push_str(&delta);
                    self.lock_logs()
                        .update_message(conversation_id, message_key, message.clone());
                    self.events.emit(GenerationEvent::Content {
                        conversation_id: conversation_id.to_string(),
                        message_key: message_key.to_string(),
                        text: message.raw_ai.clone(),
                    });
                }
            }
        }
    }

    async fn finalize(
        &self,
        request: &TurnRequest,
        message_key: String,
        mut message: Message,
        end: StreamEnd,
    ) -> TurnOutcome {
        let conversation_id = request.conversation_id.as_str();
        let (stop_reason, error) = match end {
            StreamEnd::Closed if message.raw_ai.is_empty() => (StopReason::StreamEmpty, None),
            StreamEnd::Closed => (StopReason::Finish, None),
            StreamEnd::Cancelled => (StopReason::Cancel, None),
            StreamEnd::Failed(e) => (StopReason::Error, Some(e)),
        };
        message.stop_reason = Some(stop_reason);
        message.ai_token_count = self.tokens.count(&message.raw_ai);

        tracing::info!(
            conversation_id = %conversation_id,
            stop_reason = stop_reason.as_str(),
            ai_tokens = message.ai_token_count,
            "generation ended"
        );
        if let Some(err) = &error {
            self.report_error(conversation_id, err);
        }

        let outcome = if message.raw_ai.is_empty() {
            self.recover_invalid_state(conversation_id);
            TurnOutcome::RolledBack {
                message: message.clone(),
            }
        } else {
            let resident = {
                let mut logs = self.lock_logs();
                // False when the history was reset while the turn ran.
                let resident = logs.update_message(conversation_id, &message_key, message.clone());
                if resident {
                    logs.add_context(
                        conversation_id,
                        Uuid::new_v4().to_string(),
                        ContextEntry::new(Role::Assistant, message.raw_ai.clone(), message.ai_token_count),
                        true,
                    );
                }
                resident
            };
            if resident {
                self.persist(request, &message).await;
                TurnOutcome::Kept {
                    message_key: message_key.clone(),
                    message: message.clone(),
                }
            } else {
                tracing::info!(conversation_id = %conversation_id, "history reset during turn, result discarded");
                TurnOutcome::RolledBack {
                    message: message.clone(),
                }
            }
        };

        self.events.emit(GenerationEvent::Finished {
            conversation_id: conversation_id.to_string(),
            message_key,
            stop_reason,
            message,
        });
        outcome
    }

    async fn persist(&self, request: &TurnRequest, message: &Message) {
        let (Some(store), Some(session_id)) = (&self.store, &request.session_id) else {
            return;
        };
        match store.add_message(session_id, &message.to_new()).await {
            Ok(stored) => {
                tracing::debug!(session_id = %session_id, id = stored.id, position = stored.position, "message persisted");
            }
            Err(e) => self.report_error(&request.conversation_id, &TransportError::from(e)),
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    fn set_phase(&self, guard: &TurnGuard, phase: TurnPhase) {
        guard.set_phase(phase);
        tracing::debug!(phase = ?phase, "turn phase");
        self.events.emit(GenerationEvent::PhaseChanged { phase });
    }

    pub(super) fn report_error(&self, conversation_id: &str, err: &TransportError) {
        tracing::warn!(conversation_id = %conversation_id, error = %err, "turn error");
        self.events.emit(GenerationEvent::Error {
            conversation_id: conversation_id.to_string(),
            notice: err.user_notice(),
            detail: err.to_string(),
        });
    }
}

/// Drop the oldest entries, a pair at a time, until `history` fits `budget`.
///
/// The trimmer always keeps the newest complete pair; a pair larger than the
/// budget on its own stays in the log but is not sent.
fn cap_history(mut history: Vec<ContextEntry>, budget: u32) -> Vec<ContextEntry> {
    let mut total: u64 = history.iter().map(|e| u64::from(e.token_count)).sum();
    let mut cut = 0;
    while total > u64::from(budget) && cut < history.len() {
        let step = 2.min(history.len() - cut);
        total -= history[cut..cut + step]
            .iter()
            .map(|e| u64::from(e.token_count))
            .sum::<u64>();
        cut += step;
    }
    if cut > 0 {
        tracing::info!(
            withheld = cut,
            budget,
            sent_tokens = total,
            "history over budget, oldest entries withheld from request"
        );
        history.drain(..cut);
    }
    history
}

/// Retrieval runs only for inputs of at least `min_chars` characters.
fn should_perform_rag(input: &str, min_chars: usize) -> bool {
    input.chars().count() >= min_chars
}

/// Primary hashtags at the primary threshold; when that finds nothing and
/// secondary hashtags exist, one more query over them at the fallback
/// threshold.
async fn query_with_fallback(
    retriever: &dyn Retriever,
    request: &TurnRequest,
    settings: &RetrievalConfig,
) -> Result<Vec<RetrievedFragment>, RetrievalError> {
    let mut query = RetrievalQuery {
        text: request.input.trim().to_string(),
        language_code: request.language_code.clone(),
        hashtags: request.hashtags.clone(),
        secondary_hashtags: request.secondary_hashtags.clone(),
        similarity_threshold: settings.primary_threshold,
        max_results: settings.max_results,
        user_id: request.user_id.clone(),
    };
    let mut fragments = retriever.retrieve(&query).await?;

    if fragments.is_empty() && !request.secondary_hashtags.is_empty() {
        query.hashtags = request.secondary_hashtags.clone();
        query.secondary_hashtags = Vec::new();
        query.similarity_threshold = settings.fallback_threshold;
        fragments = retriever.retrieve(&query).await?;
    }

    fragments.truncate(settings.max_results as usize);
    Ok(fragments)
}

fn compose_system_prompt(base: &str, relevant: Option<&[String]>) -> String {
    match relevant {
        Some(fragments) if !fragments.is_empty() => {
            let mut prompt = String::from(base.trim_end());
            prompt.push_str("\n\nRelevant content:\n");
            for fragment in fragments {
                prompt.push_str("- ");
                prompt.push_str(fragment.trim());
                prompt.push('\n');
            }
            prompt
        }
        _ => base.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
