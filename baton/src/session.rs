//! Session storage for conversation history across runs.
//!
//! A [`Session`] holds the ordered message history of one conversation,
//! keyed by its id. The runner reads recent history before a run and appends
//! the run's new messages after it completes.
//!
//! | Backend | Storage | Feature |
//! |---------|---------|---------|
//! | [`InMemorySession`] | `tokio::sync::RwLock<Vec<Message>>` | always |
//! | [`SqliteSession`] | SQLite via `rusqlite` | `sqlite` |

mod error;
mod in_memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use error::{SessionError, SessionResult};
pub use in_memory::InMemorySession;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSession;

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;

/// A shared dynamic session.
pub type SharedSession = Arc<dyn Session>;

/// Durable, ordered conversation history.
#[async_trait]
pub trait Session: Send + Sync {
    /// The session identifier.
    fn id(&self) -> &str;

    /// Retrieve history, oldest first.
    ///
    /// With `Some(n)`, returns the latest `n` messages in chronological order.
    async fn get_items(&self, limit: Option<usize>) -> SessionResult<Vec<Message>>;

    /// Append messages in order.
    async fn add_items(&self, items: &[Message]) -> SessionResult<()>;

    /// Remove and return the most recent message.
    async fn pop_item(&self) -> SessionResult<Option<Message>>;

    /// Remove every message.
    async fn clear(&self) -> SessionResult<()>;

    /// Release the backing storage. Later calls fail with [`SessionError::Closed`].
    async fn close(&self) -> SessionResult<()>;

    /// Number of stored messages.
    async fn len(&self) -> SessionResult<usize> {
        Ok(self.get_items(None).await?.len())
    }

    /// Check if the session holds no messages.
    async fn is_empty(&self) -> SessionResult<bool> {
        Ok(self.len().await? == 0)
    }
}
