//! SQLite-backed conversation store for deployments that need history to
//! survive restarts.
//!
//! Rows are insertion-ordered per session; reads return the most-recent
//! `max_messages` rows in original order.  A [`rusqlite::Connection`]
//! wrapped in `Arc<Mutex<…>>` keeps the store `Send + Sync` while honoring
//! SQLite's single-writer requirement.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};

use super::conversation::MemoryMessage;
use crate::llm::ChatRole;

/// DDL executed when the store is opened.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversation_session
    ON conversation_messages (session_id, id);
"#;

fn role_to_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn str_to_role(s: &str) -> ChatRole {
    match s {
        "system" => ChatRole::System,
        "assistant" => ChatRole::Assistant,
        "tool" => ChatRole::Tool,
        _ => ChatRole::User,
    }
}

/// Persistent, session-scoped conversation history.
pub struct SqliteConversationStore {
    max_messages: usize,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path, max_messages: usize) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("failed to open {path:?}: {e}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| format!("failed to initialize schema: {e}"))?;
        Ok(Self {
            max_messages,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, for tests and ephemeral deployments.
    pub fn open_in_memory(max_messages: usize) -> Result<Self, String> {
        let conn =
            Connection::open_in_memory().map_err(|e| format!("failed to open memory db: {e}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| format!("failed to initialize schema: {e}"))?;
        Ok(Self {
            max_messages,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append one message to a session.
    pub fn append(&self, session_id: &str, message: &MemoryMessage) -> Result<(), String> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversation_messages (session_id, role, content, created_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                role_to_str(message.role),
                message.content,
                message.timestamp.timestamp_millis(),
            ],
        )
        .map_err(|e| format!("insert failed: {e}"))?;
        Ok(())
    }

    /// The last `max_messages` rows of a session, oldest first.
    pub fn history(&self, session_id: &str) -> Result<Vec<MemoryMessage>, String> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT role, content, created_at_ms FROM conversation_messages
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| format!("prepare failed: {e}"))?;

        let rows = stmt
            .query_map(params![session_id, self.max_messages as i64], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                let created_at_ms: i64 = row.get(2)?;
                Ok(MemoryMessage {
                    role: str_to_role(&role),
                    content,
                    timestamp: DateTime::<Utc>::from_timestamp_millis(created_at_ms)
                        .unwrap_or_else(Utc::now),
                })
            })
            .map_err(|e| format!("query failed: {e}"))?;

        let mut messages: Vec<MemoryMessage> = rows
            .collect::<Result<_, _>>()
            .map_err(|e| format!("row decode failed: {e}"))?;
        messages.reverse();
        Ok(messages)
    }

    /// Delete all rows of a session.  Returns the number of rows removed.
    pub fn remove(&self, session_id: &str) -> Result<usize, String> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM conversation_messages WHERE session_id = ?1",
            params![session_id],
        )
        .map_err(|e| format!("delete failed: {e}"))
    }

    /// Delete every session whose newest message is older than `now - ttl`.
    /// Returns the number of rows removed.
    pub fn cleanup_expired_sessions(&self, ttl: Duration) -> Result<usize, String> {
        let cutoff_ms = Utc::now().timestamp_millis() - ttl.as_millis() as i64;
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM conversation_messages WHERE session_id IN (
                 SELECT session_id FROM conversation_messages
                 GROUP BY session_id
                 HAVING MAX(created_at_ms) < ?1
             )",
            params![cutoff_ms],
        )
        .map_err(|e| format!("cleanup failed: {e}"))
    }
}
