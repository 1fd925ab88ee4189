pub mod error;
pub mod migrations;

pub use error::StoreError;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use parley_types::ChatMessage;

/// Durable, ordered log of chat messages; the sole authority for `id`
/// and `created_at`.
///
/// Appends are serialized by the connection mutex, so `id` assignment has
/// no gaps or races: `id` order equals persistence order. Messages are
/// immutable once persisted; no update or delete path exists.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Message store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a message and return the stored record, fully populated with
    /// the server-assigned `id` and `created_at`.
    ///
    /// Rejects without persisting when `author` or `body` is empty after
    /// trimming. The strings are stored as supplied; trimming is only the
    /// validation rule.
    pub fn append(&self, author: &str, body: &str) -> Result<ChatMessage, StoreError> {
        if author.trim().is_empty() {
            return Err(StoreError::EmptyAuthor);
        }
        if body.trim().is_empty() {
            return Err(StoreError::EmptyBody);
        }

        let created_at = Utc::now();
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO messages (author, body, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![author, body, created_at],
        )?;

        Ok(ChatMessage {
            id: conn.last_insert_rowid(),
            author: author.to_string(),
            body: body.to_string(),
            created_at,
        })
    }

    /// The most recent `limit` messages in ascending `id` order; fewer if
    /// the store holds fewer.
    pub fn recent(&self, limit: u32) -> Result<Vec<ChatMessage>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, author, body, created_at FROM messages
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let mut messages = stmt
            .query_map([limit], |row| {
                Ok(ChatMessage {
                    id: row.get(0)?,
                    author: row.get(1)?,
                    body: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // The query walks newest-first; flip to ascending id for callers.
        messages.reverse();
        Ok(messages)
    }
}
