//! Short-lived cache for values derived from the configuration document.
//!
//! The cache is purely an invalidation target: the reconciliation pipeline
//! deletes both keys before touching the connection registry and writes the
//! tool list back at the end. Readers must treat a miss as "unknown".

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Logical cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Snapshot of the startup configuration served to clients.
    StartupConfigSnapshot,
    /// Authenticated, available tool list computed by reconciliation.
    ToolList,
}

impl CacheKey {
    pub const ALL: [CacheKey; 2] = [CacheKey::StartupConfigSnapshot, CacheKey::ToolList];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheKey::StartupConfigSnapshot => "startupConfigSnapshot",
            CacheKey::ToolList => "toolList",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait DerivedCache: Send + Sync + fmt::Debug {
    async fn get(&self, key: CacheKey) -> Option<Value>;
    async fn set(&self, key: CacheKey, value: Value);
    async fn delete(&self, key: CacheKey);
}

/// Process-local cache with a fixed time-to-live per entry.
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, (Instant, Value)>>,
    ttl: Duration,
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl DerivedCache for InMemoryCache {
    async fn get(&self, key: CacheKey) -> Option<Value> {
        let entries = self.entries.read().await;
        let (stored_at, value) = entries.get(&key)?;
        // Expired entries are left in place; the next set or delete replaces them.
        if stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(value.clone())
    }

    async fn set(&self, key: CacheKey, value: Value) {
        self.entries
            .write()
            .await
            .insert(key, (Instant::now(), value));
    }

    async fn delete(&self, key: CacheKey) {
        self.entries.write().await.remove(&key);
    }
}
