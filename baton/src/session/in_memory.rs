//! In-memory session implementation.
//!
//! [`InMemorySession`] keeps history in a `Vec<Message>` behind a
//! `tokio::sync::RwLock`. Data is lost when the value is dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Session, SessionError, SessionResult};
use crate::message::Message;

/// In-memory session backed by `tokio::sync::RwLock<Vec<Message>>`.
#[derive(Debug)]
pub struct InMemorySession {
    id: String,
    messages: RwLock<Vec<Message>>,
    closed: AtomicBool,
}

impl InMemorySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_messages(id, Vec::new())
    }

    /// Creates a session pre-populated with `messages`.
    #[must_use]
    pub fn with_messages(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages: RwLock::new(messages),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SessionError::Closed(self.id.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_items(&self, limit: Option<usize>) -> SessionResult<Vec<Message>> {
        self.ensure_open()?;
        let guard = self.messages.read().await;
        match limit {
            Some(n) if n < guard.len() => Ok(guard[guard.len() - n..].to_vec()),
            _ => Ok(guard.clone()),
        }
    }

    async fn add_items(&self, items: &[Message]) -> SessionResult<()> {
        self.ensure_open()?;
        if items.is_empty() {
            return Ok(());
        }
        self.messages.write().await.extend_from_slice(items);
        Ok(())
    }

    async fn pop_item(&self) -> SessionResult<Option<Message>> {
        self.ensure_open()?;
        Ok(self.messages.write().await.pop())
    }

    async fn clear(&self) -> SessionResult<()> {
        self.ensure_open()?;
        self.messages.write().await.clear();
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        self.closed.store(true, Ordering::Release);
        self.messages.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> SessionResult<usize> {
        self.ensure_open()?;
        Ok(self.messages.read().await.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::message::Role;

    fn sample_messages(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("user-{i}"))
                } else {
                    Message::assistant(format!("assistant-{i}"))
                }
            })
            .collect()
    }

    mod get_items {
        use super::*;

        #[tokio::test]
        async fn none_returns_everything() {
            let msgs = sample_messages(4);
            let session = InMemorySession::with_messages("g1", msgs.clone());
            assert_eq!(session.get_items(None).await.unwrap(), msgs);
        }

        #[tokio::test]
        async fn limit_returns_latest_in_order() {
            let msgs = sample_messages(5);
            let session = InMemorySession::with_messages("g2", msgs.clone());
            let tail = session.get_items(Some(2)).await.unwrap();
            assert_eq!(tail, msgs[3..5]);
        }

        #[tokio::test]
        async fn limit_larger_than_len_returns_all() {
            let msgs = sample_messages(2);
            let session = InMemorySession::with_messages("g3", msgs.clone());
            assert_eq!(session.get_items(Some(100)).await.unwrap(), msgs);
        }

        #[tokio::test]
        async fn limit_zero_returns_empty() {
            let session = InMemorySession::with_messages("g4", sample_messages(3));
            assert!(session.get_items(Some(0)).await.unwrap().is_empty());
        }
    }

    mod mutation {
        use super::*;

        #[tokio::test]
        async fn add_appends_in_order() {
            let session = InMemorySession::new("m1");
            session.add_items(&sample_messages(2)).await.unwrap();
            session
                .add_items(&[Message::user("third")])
                .await
                .unwrap();
            let all = session.get_items(None).await.unwrap();
            assert_eq!(all.len(), 3);
            assert_eq!(all[2].content, "third");
        }

        #[tokio::test]
        async fn pop_returns_latest() {
            let session = InMemorySession::with_messages("m2", sample_messages(2));
            let popped = session.pop_item().await.unwrap().unwrap();
            assert_eq!(popped.role, Role::Assistant);
            assert_eq!(session.len().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn pop_on_empty_is_none() {
            let session = InMemorySession::new("m3");
            assert!(session.pop_item().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn clear_empties() {
            let session = InMemorySession::with_messages("m4", sample_messages(3));
            session.clear().await.unwrap();
            assert!(session.is_empty().await.unwrap());
        }
    }

    mod close {
        use super::*;

        #[tokio::test]
        async fn operations_fail_after_close() {
            let session = InMemorySession::with_messages("c1", sample_messages(1));
            session.close().await.unwrap();
            let err = session.get_items(None).await.unwrap_err();
            assert!(matches!(err, SessionError::Closed(ref id) if id == "c1"));
            assert!(session.add_items(&sample_messages(1)).await.is_err());
        }
    }

    mod concurrency {
        use super::*;

        #[tokio::test]
        async fn concurrent_writers_all_land() {
            let session = Arc::new(InMemorySession::new("cc"));
            let mut handles = Vec::new();
            for i in 0..8 {
                let s = Arc::clone(&session);
                handles.push(tokio::spawn(async move {
                    s.add_items(&[Message::user(format!("w{i}"))]).await.unwrap();
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
            assert_eq!(session.len().await.unwrap(), 8);
        }
    }
}
