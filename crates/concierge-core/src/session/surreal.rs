//! SurrealDB-backed session store
//!
//! Stores one record per session key in a `sessions` table. Turns are
//! serialized to a JSON string field rather than nested records, so the
//! store stays schema-agnostic about the conversation shape.

use async_trait::async_trait;
use concierge_common::{ConciergeError, Conversation, Result, Turn};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem, SurrealKv};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::SessionStore;

const NAMESPACE: &str = "concierge";
const DATABASE: &str = "sessions";

/// Raw record shape as read back from SurrealDB
#[derive(Debug, Deserialize)]
struct SessionRecord {
    turns: String,
}

/// Session store persisting conversations in SurrealDB
pub struct SurrealSessionStore {
    db: Surreal<Db>,
    initialized: Arc<RwLock<bool>>,
}

impl SurrealSessionStore {
    /// Open a file-backed store at the given path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db: Surreal<Db> = Surreal::new::<SurrealKv>(path.as_ref())
            .await
            .map_err(|e| ConciergeError::Store(format!("failed to open SurrealDB: {}", e)))?;
        Self::with_db(db).await
    }

    /// Open an in-memory store (useful for development and tests)
    pub async fn in_memory() -> Result<Self> {
        let db: Surreal<Db> = Surreal::new::<Mem>(())
            .await
            .map_err(|e| ConciergeError::Store(format!("failed to create SurrealDB: {}", e)))?;
        Self::with_db(db).await
    }

    async fn with_db(db: Surreal<Db>) -> Result<Self> {
        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| ConciergeError::Store(format!("failed to select namespace: {}", e)))?;

        info!("SurrealDB session store ready");
        Ok(Self {
            db,
            initialized: Arc::new(RwLock::new(false)),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        self.db
            .query("DEFINE TABLE IF NOT EXISTS sessions SCHEMALESS;")
            .await
            .map_err(|e| ConciergeError::Store(format!("failed to define table: {}", e)))?;

        *initialized = true;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SurrealSessionStore {
    async fn load(&self, session_key: &str) -> Result<Option<Conversation>> {
        self.ensure_schema().await?;

        let mut response = self
            .db
            .query("SELECT * FROM type::thing('sessions', $key)")
            .bind(("key", session_key.to_string()))
            .await
            .map_err(|e| ConciergeError::Store(format!("load failed: {}", e)))?;

        let record: Option<SessionRecord> = response
            .take(0)
            .map_err(|e| ConciergeError::Store(format!("load decode failed: {}", e)))?;

        match record {
            Some(record) => {
                let turns: Vec<Turn> = serde_json::from_str(&record.turns)?;
                debug!("Loaded session '{}' with {} turns", session_key, turns.len());
                Ok(Some(Conversation {
                    session_key: session_key.to_string(),
                    turns,
                }))
            }
            None => {
                debug!("No stored session for '{}'", session_key);
                Ok(None)
            }
        }
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.ensure_schema().await?;

        let turns_json = serde_json::to_string(&conversation.turns)?;

        self.db
            .query(
                "
                UPSERT type::thing('sessions', $key) SET
                    turns = $turns,
                    updated_at = time::now()
            ",
            )
            .bind(("key", conversation.session_key.clone()))
            .bind(("turns", turns_json))
            .await
            .map_err(|e| ConciergeError::Store(format!("save failed: {}", e)))?
            .check()
            .map_err(|e| ConciergeError::Store(format!("save rejected: {}", e)))?;

        debug!(
            "Saved session '{}' with {} turns",
            conversation.session_key,
            conversation.len()
        );
        Ok(())
    }
}
