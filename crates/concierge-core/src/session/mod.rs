//! Session storage for conversation state
//!
//! A session store persists one serialized conversation per session key.
//! Writes follow last-write-wins semantics; the store performs no
//! per-session locking (callers are expected to keep at most one in-flight
//! turn per session key).

mod surreal;

pub use surreal::SurrealSessionStore;

use async_trait::async_trait;
use concierge_common::{Conversation, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Persistence seam for conversation state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the conversation for a session key, `None` if never seen
    async fn load(&self, session_key: &str) -> Result<Option<Conversation>>;

    /// Persist the conversation, replacing any previous state for its key
    async fn save(&self, conversation: &Conversation) -> Result<()>;
}

/// In-memory session store, the default backend and the one used in tests
///
/// State is lost on restart; deployments that need durability configure the
/// SurrealDB store instead.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Conversation>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, for health reporting
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_key: &str) -> Result<Option<Conversation>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_key).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        debug!(
            "Saving session '{}' with {} turns",
            conversation.session_key,
            conversation.len()
        );
        let mut sessions = self.sessions.write().await;
        sessions.insert(conversation.session_key.clone(), conversation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_common::Turn;

    #[tokio::test]
    async fn test_unknown_key_loads_none() {
        let store = MemorySessionStore::new();
        assert!(store.load("never-seen").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemorySessionStore::new();
        let mut convo = Conversation::new("s1");
        convo.push(Turn::user("hello"));
        convo.push(Turn::assistant("Hi there"));
        store.save(&convo).await.unwrap();

        let loaded = store.load("s1").await.unwrap().expect("stored");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.turns[0].content, "hello");
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemorySessionStore::new();
        let mut first = Conversation::new("s1");
        first.push(Turn::user("one"));
        store.save(&first).await.unwrap();

        let mut second = Conversation::new("s1");
        second.push(Turn::user("two"));
        second.push(Turn::assistant("three"));
        store.save(&second).await.unwrap();

        let loaded = store.load("s1").await.unwrap().expect("stored");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.turns[0].content, "two");
    }
}
