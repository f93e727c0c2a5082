//! Server-side session storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::StoreError;
use crate::types::SessionDigest;

/// Everything persisted for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub values: HashMap<String, Value>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Key-value session persistence, keyed by the digest of the session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session. Expired records are reported as absent.
    async fn load(&self, key: &SessionDigest) -> Result<Option<SessionRecord>, StoreError>;

    async fn save(&self, key: &SessionDigest, record: &SessionRecord) -> Result<(), StoreError>;

    /// Remove a session. Removing a missing session succeeds.
    async fn delete(&self, key: &SessionDigest) -> Result<(), StoreError>;
}

/// Process-local session store.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<SessionDigest, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired record. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "expired sessions removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &SessionDigest) -> Result<Option<SessionRecord>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|record| !record.is_expired(Utc::now()))
            .cloned())
    }

    async fn save(&self, key: &SessionDigest, record: &SessionRecord) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &SessionDigest) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
