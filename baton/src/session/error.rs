//! Session storage errors.

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by session backends.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// SQLite failure.
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored message could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lock guarding the backend was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),

    /// The session was closed.
    #[error("session '{0}' is closed")]
    Closed(String),

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}
