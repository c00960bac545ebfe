//! SQLite message store for sessions and finalized messages.
//!
//! Uses `rusqlite` synchronously behind a mutex; every call is short and
//! never held across an await. WAL mode is enabled for concurrent reads.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::errors::StoreError;
use super::types::{
    ContextEntry, NewMessage, PageRequest, SessionRecord, StopReason, StoredMessage,
};
use crate::generation::boundaries::MessageStore;
use crate::inference::types::Role;

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite handle for chat sessions.
pub struct ChatDatabase {
    conn: Mutex<Connection>,
}

impl ChatDatabase {
    /// Open (or create) the database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                character_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                raw_human TEXT,
                raw_ai TEXT NOT NULL,
                stop_reason TEXT,
                ai_token_count INTEGER NOT NULL DEFAULT 0,
                human_token_count INTEGER NOT NULL DEFAULT 0,
                llm_model_used TEXT NOT NULL,
                relevant_content TEXT,
                sources TEXT NOT NULL DEFAULT '[]',
                content_ids TEXT NOT NULL DEFAULT '[]',
                FOREIGN KEY (session_id) REFERENCES sessions(id),
                UNIQUE (session_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON messages(session_id, position);
            ",
        )?;
        Ok(())
    }

    // ─── Sessions ───────────────────────────────────────────────────────

    pub fn create_session_sync(&self, character_id: &str) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            character_id: character_id.to_string(),
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO sessions (id, character_id, created_at) VALUES (?1, ?2, ?3)",
            params![record.session_id, record.character_id, record.created_at.to_rfc3339()],
        )?;
        tracing::info!(session_id = %record.session_id, character_id, "session created");
        Ok(record)
    }

    /// A live (not soft-deleted) session.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, character_id, created_at FROM sessions
                 WHERE id = ?1 AND deleted = 0",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(session_id, character_id, created_at)| {
            Ok(SessionRecord {
                session_id,
                character_id,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    /// Soft-delete: sets the migration flag, keeps the rows.
    pub fn delete_session_sync(&self, session_id: &str) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE sessions SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            params![session_id],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        tracing::info!(session_id, "session soft-deleted");
        Ok(())
    }

    // ─── Messages ───────────────────────────────────────────────────────

    pub fn insert_message(
        &self,
        session_id: &str,
        message: &NewMessage,
    ) -> Result<StoredMessage, StoreError> {
        let relevant = message
            .relevant_content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let sources = serde_json::to_string(&message.sources)?;
        let content_ids = serde_json::to_string(&message.content_ids)?;
        let created_at = Utc::now();

        let conn = self.conn();
        require_live_session(&conn, session_id)?;

        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO messages (session_id, position, created_at, raw_human, raw_ai,
                 stop_reason, ai_token_count, human_token_count, llm_model_used,
                 relevant_content, sources, content_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                session_id,
                position,
                created_at.to_rfc3339(),
                message.raw_human,
                message.raw_ai,
                message.stop_reason.map(|r| r.as_str()),
                message.ai_token_count,
                message.human_token_count,
                message.llm_model_used,
                relevant,
                sources,
                content_ids,
            ],
        )?;

        Ok(StoredMessage {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            position: position.max(0) as u64,
            created_at,
            message: message.clone(),
        })
    }

    /// One page of messages. Page 0 holds the newest; each page is returned
    /// oldest first. Soft-deleted sessions read as missing.
    pub fn get_messages_page(
        &self,
        session_id: &str,
        page: PageRequest,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = {
            let conn = self.conn();
            require_live_session(&conn, session_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, session_id, position, created_at, raw_human, raw_ai, stop_reason,
                        ai_token_count, human_token_count, llm_model_used, relevant_content, sources,
                        content_ids
                 FROM messages WHERE session_id = ?1
                 ORDER BY position DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(
                    params![session_id, page.page_size, page.offset() as i64],
                    MessageRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut messages = rows
            .into_iter()
            .map(MessageRow::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Newest whole pairs whose token sum fits `max_tokens`, oldest first.
    ///
    /// Messages missing either side contribute no context. A reply cut short
    /// by a stream error still counts: its pair was committed. Stops at the
    /// first pair that does not fit. Soft-deleted sessions read as missing.
    pub fn get_context_within_budget(
        &self,
        session_id: &str,
        max_tokens: u32,
    ) -> Result<Vec<ContextEntry>, StoreError> {
        let rows = {
            let conn = self.conn();
            require_live_session(&conn, session_id)?;
            let mut stmt = conn.prepare(
                "SELECT raw_human, raw_ai, human_token_count, ai_token_count
                 FROM messages WHERE session_id = ?1
                 ORDER BY position DESC",
            )?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let budget = u64::from(max_tokens);
        let mut used: u64 = 0;
        let mut pairs: Vec<(ContextEntry, ContextEntry)> = Vec::new();
        for (human, ai, human_tokens, ai_tokens) in rows {
            let Some(human) = human.filter(|h| !h.trim().is_empty()) else {
                continue;
            };
            if ai.trim().is_empty() {
                continue;
            }
            let cost = u64::from(human_tokens) + u64::from(ai_tokens);
            if used + cost > budget {
                break;
            }
            used += cost;
            pairs.push((
                ContextEntry::new(Role::User, human, human_tokens),
                ContextEntry::new(Role::Assistant, ai, ai_tokens),
            ));
        }

        Ok(pairs
            .into_iter()
            .rev()
            .flat_map(|(u, a)| [u, a])
            .collect())
    }

    pub fn message_count(&self, session_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl MessageStore for ChatDatabase {
    async fn create_session(&self, character_id: &str) -> Result<SessionRecord, StoreError> {
        self.create_session_sync(character_id)
    }

    async fn add_message(&self, session_id: &str, message: &NewMessage) -> Result<StoredMessage, StoreError> {
        self.insert_message(session_id, message)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.delete_session_sync(session_id)
    }

    async fn fetch_messages(&self, session_id: &str, page: PageRequest) -> Result<Vec<StoredMessage>, StoreError> {
        self.get_messages_page(session_id, page)
    }

    async fn fetch_context(&self, session_id: &str, max_tokens: u32) -> Result<Vec<ContextEntry>, StoreError> {
        self.get_context_within_budget(session_id, max_tokens)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Raw column values, decoded outside the rusqlite closure.
struct MessageRow {
    id: i64,
    session_id: String,
    position: i64,
    created_at: String,
    raw_human: Option<String>,
    raw_ai: String,
    stop_reason: Option<String>,
    ai_token_count: u32,
    human_token_count: u32,
    llm_model_used: String,
    relevant_content: Option<String>,
    sources: String,
    content_ids: String,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            position: row.get(2)?,
            created_at: row.get(3)?,
            raw_human: row.get(4)?,
            raw_ai: row.get(5)?,
            stop_reason: row.get(6)?,
            ai_token_count: row.get(7)?,
            human_token_count: row.get(8)?,
            llm_model_used: row.get(9)?,
            relevant_content: row.get(10)?,
            sources: row.get(11)?,
            content_ids: row.get(12)?,
        })
    }

    fn into_stored(self) -> Result<StoredMessage, StoreError> {
        let stop_reason = match self.stop_reason.as_deref() {
            None => None,
            Some(s) => Some(StopReason::parse(s).ok_or_else(|| StoreError::SerializationError {
                reason: format!("unknown stop reason '{s}'"),
            })?),
        };
        let relevant_content = self
            .relevant_content
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?;

        Ok(StoredMessage {
            id: self.id,
            session_id: self.session_id,
            position: self.position.max(0) as u64,
            created_at: parse_timestamp(&self.created_at)?,
            message: NewMessage {
                raw_human: self.raw_human,
                raw_ai: self.raw_ai,
                stop_reason,
                ai_token_count: self.ai_token_count,
                human_token_count: self.human_token_count,
                llm_model_used: self.llm_model_used,
                relevant_content,
                sources: serde_json::from_str(&self.sources)?,
                content_ids: serde_json::from_str(&self.content_ids)?,
            },
        })
    }
}

fn require_live_session(conn: &Connection, session_id: &str) -> Result<(), StoreError> {
    let live = conn
        .query_row(
            "SELECT 1 FROM sessions WHERE id = ?1 AND deleted = 0",
            params![session_id],
            |_| Ok(()),
        )
        .optional()?;
    live.ok_or_else(|| StoreError::SessionNotFound {
        session_id: session_id.to_string(),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::SerializationError {
            reason: format!("bad timestamp '{s}': {e}"),
        })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
