//! SQLite-backed session implementation.
//!
//! [`SqliteSession`] persists conversation history in a SQLite database so it
//! survives process restarts. Access goes through [`rusqlite`] and is bridged
//! to async via [`tokio::task::spawn_blocking`].
//!
//! Messages are stored as JSON rows in the `messages` table, ordered by the
//! auto-incrementing `id`. WAL journal mode and a composite index on
//! `(session_id, id)` keep reads cheap.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{Session, SessionError, SessionResult};
use crate::message::Message;

/// SQLite-backed session for persistent conversation history.
///
/// Clones share one connection, so several handles (even with different
/// session ids) may use a single database. Closing any handle closes the
/// shared connection.
#[derive(Debug, Clone)]
pub struct SqliteSession {
    id: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteSession {
    /// Opens (or creates) a database at `path` and initializes the schema.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>, session_id: impl Into<String>) -> SessionResult<Self> {
        Self::from_connection(Connection::open(path.as_ref())?, session_id)
    }

    /// Opens an ephemeral in-memory database.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub fn in_memory(session_id: impl Into<String>) -> SessionResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, session_id)
    }

    /// Wraps an existing [`Connection`], applying pragmas and schema setup.
    ///
    /// # Errors
    ///
    /// Fails when a pragma or schema statement is rejected.
    pub fn from_connection(conn: Connection, session_id: impl Into<String>) -> SessionResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA foreign_keys = ON;\
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id   TEXT    NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
                message_data TEXT    NOT NULL,
                created_at   TEXT    NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages (session_id, id);",
        )?;

        Ok(Self {
            id: session_id.into(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Another session id on the same database.
    #[must_use]
    pub fn with_id(&self, session_id: impl Into<String>) -> Self {
        Self {
            id: session_id.into(),
            conn: Arc::clone(&self.conn),
        }
    }

    /// Runs a synchronous closure on the blocking thread pool with the
    /// locked connection.
    async fn blocking<F, T>(&self, f: F) -> SessionResult<T>
    where
        F: FnOnce(&Connection) -> SessionResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let id = self.id.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| SessionError::Lock(e.to_string()))?;
            let conn = guard.as_ref().ok_or_else(|| SessionError::Closed(id))?;
            f(conn)
        })
        .await
        .map_err(|e| SessionError::Task(e.to_string()))?
    }
}

fn decode_rows(rows: &[String]) -> SessionResult<Vec<Message>> {
    rows.iter()
        .map(|json| serde_json::from_str::<Message>(json).map_err(SessionError::from))
        .collect()
}

#[async_trait]
impl Session for SqliteSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_items(&self, limit: Option<usize>) -> SessionResult<Vec<Message>> {
        let session_id = self.id.clone();
        self.blocking(move |conn| {
            let rows = match limit {
                Some(n) => {
                    let n = i64::try_from(n).unwrap_or(i64::MAX);
                    let mut stmt = conn.prepare(
                        "SELECT message_data FROM messages \
                         WHERE session_id = ?1 \
                         ORDER BY id DESC LIMIT ?2",
                    )?;
                    let mut rows = stmt
                        .query_map(params![session_id, n], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.reverse();
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT message_data FROM messages \
                         WHERE session_id = ?1 \
                         ORDER BY id ASC",
                    )?;
                    stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            decode_rows(&rows)
        })
        .await
    }

    async fn add_items(&self, items: &[Message]) -> SessionResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let session_id = self.id.clone();
        let serialized = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<String>, _>>()?;

        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO sessions (session_id) VALUES (?1)",
                params![session_id],
            )?;

            {
                let mut stmt =
                    tx.prepare("INSERT INTO messages (session_id, message_data) VALUES (?1, ?2)")?;
                for json in &serialized {
                    stmt.execute(params![session_id, json])?;
                }
            }

            tx.execute(
                "UPDATE sessions SET updated_at = CURRENT_TIMESTAMP \
                 WHERE session_id = ?1",
                params![session_id],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn pop_item(&self) -> SessionResult<Option<Message>> {
        let session_id = self.id.clone();
        self.blocking(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "DELETE FROM messages \
                     WHERE id = ( \
                         SELECT id FROM messages \
                         WHERE session_id = ?1 \
                         ORDER BY id DESC LIMIT 1 \
                     ) RETURNING message_data",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;

            match json {
                Some(j) => Ok(Some(serde_json::from_str(&j)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn clear(&self) -> SessionResult<()> {
        let session_id = self.id.clone();
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![session_id],
            )?;
            tx.execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> SessionResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| SessionError::Lock(e.to_string()))?;
            match guard.take() {
                Some(conn) => conn.close().map_err(|(_, e)| SessionError::from(e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| SessionError::Task(e.to_string()))?
    }

    async fn len(&self) -> SessionResult<usize> {
        let session_id = self.id.clone();
        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }
}
