use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::errors::ClientError;

/// Identity of a cached server read: resource kind + scope (all keys are
/// implicitly scoped to the current user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Matches,
    Applications,
    Profile,
    MatchStats,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Matches => "matches",
            CacheKey::Applications => "applications",
            CacheKey::Profile => "profile",
            CacheKey::MatchStats => "match_stats",
        }
    }
}

/// Memoizes server reads until a mutation invalidates them.
///
/// Values are stored as JSON so one cache serves every resource type.
/// Concurrent readers of the same key are coalesced behind a per-key lock;
/// every insert or invalidation bumps a watch channel so subscribers (the
/// dashboard aggregator, a view layer) know to recompute.
pub struct QueryCache {
    entries: Mutex<HashMap<CacheKey, Value>>,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    version: watch::Sender<u64>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        QueryCache {
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            version,
        }
    }

    /// Returns the cached value for `key`, or runs `fetch` and stores the
    /// result. A decode mismatch (schema drift across versions) is treated
    /// as a miss, never an error.
    pub async fn read_with<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        if let Some(value) = self.lookup::<T>(key).await {
            return Ok(value);
        }

        // Coalesce concurrent fetches of the same key.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        let _guard = gate.lock().await;

        // A coalesced peer may have populated the entry while we waited.
        if let Some(value) = self.lookup::<T>(key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        let raw = serde_json::to_value(&value)
            .with_context(|| format!("failed to encode cache entry '{}'", key.as_str()))?;
        self.entries.lock().await.insert(key, raw);
        self.bump();
        debug!(key = key.as_str(), "cache populated");
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let entries = self.entries.lock().await;
        let raw = entries.get(&key)?.clone();
        serde_json::from_value(raw).ok()
    }

    /// Forces the next read of `key` to refetch.
    pub async fn invalidate(&self, key: CacheKey) {
        if self.entries.lock().await.remove(&key).is_some() {
            debug!(key = key.as_str(), "cache invalidated");
        }
        self.bump();
    }

    /// Invalidates every key whose derived data a mutation could affect.
    pub async fn invalidate_many(&self, keys: &[CacheKey]) {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        drop(entries);
        debug!(?keys, "cache invalidated");
        self.bump();
    }

    /// Drops every entry. Used when the session terminates: no derived
    /// state may outlive the credential.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.bump();
    }

    /// Observe cache changes. The value is a monotonically increasing
    /// version; any change means "recompute what you derived".
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
