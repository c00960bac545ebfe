//! Conversation state: the per-conversation context and message logs, the
//! token-budget trimmer, token counting, translation sets and the SQLite
//! message store.

pub mod database;
pub mod errors;
pub mod log;
pub mod tokens;
pub mod translations;
pub mod trimmer;
pub mod types;

pub use database::ChatDatabase;
pub use errors::{DataIntegrityError, StoreError};
pub use log::{ConversationLog, ConversationLogs};
pub use tokens::{estimate_tokens, HeuristicTokenCounter, TokenCounter};
pub use translations::TranslationSet;
pub use trimmer::{ContextTrimmer, TrimInvalid, TrimOutcome};
pub use types::{ContextEntry, Message, NewMessage, PageRequest, SessionRecord, StopReason, StoredMessage};
