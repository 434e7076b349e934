use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;

/// Backing store for the TTL cache. Swappable so tests (or a clustered
/// deployment) can substitute their own store; values on the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value, ttl: Duration);
}

/// Process-local store with lazy expiry on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (Value, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
    }
}

/// Typed handle over a shared cache store with a fixed TTL.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCache::new()), ttl)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                // Treat undecodable entries as misses; the caller re-fetches.
                warn!("Discarding malformed cache entry for '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)?;
        self.store.set(key, encoded, self.ttl).await;
        Ok(())
    }
}
