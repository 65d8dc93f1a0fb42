use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use errors::StorageError;
use orch_core::{BackendResult, CacheCounter, CacheStore, RequestOptions, RequestPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cache store kept in process memory.
///
/// Expired entries are dropped lazily on read. An expiry of `None` never
/// lapses; it is used when the TTL reaches past what `Instant` can hold.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, (String, Option<Instant>)>,
    registry: DashSet<String>,
    hits: AtomicU64,
    stores: AtomicU64
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter_cell(&self, counter: CacheCounter) -> &AtomicU64 {
        match counter {
            CacheCounter::Hits => &self.hits,
            CacheCounter::Stores => &self.stores
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if expires_at.is_none_or(|at| at > now) {
                return Ok(Some(value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, (_, expires_at)| expires_at.is_some_and(|at| at <= now));
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StorageError> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn register_key(&self, key: &str) -> Result<(), StorageError> {
        self.registry.insert(key.to_string());
        Ok(())
    }

    async fn registered_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self.registry.iter().map(|k| k.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_registry(&self) -> Result<(), StorageError> {
        self.registry.clear();
        Ok(())
    }

    async fn increment_counter(&self, counter: CacheCounter) -> Result<u64, StorageError> {
        Ok(self.counter_cell(counter).fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn counter(&self, counter: CacheCounter) -> Result<u64, StorageError> {
        Ok(self.counter_cell(counter).load(Ordering::SeqCst))
    }

    async fn reset_counters(&self) -> Result<(), StorageError> {
        for counter in CacheCounter::ALL {
            self.counter_cell(counter).store(0, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub cache_hits: u64,
    pub cache_stores: u64,
    pub registered_keys: usize
}

/// Result cache service injected into the engine.
///
/// Owns fingerprinting, the issued-key registry and the hit/store counters on
/// top of any [`CacheStore`]. Reads never fail: store errors and undecodable
/// entries are logged and treated as misses.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    /// Cache key of one call against one backend.
    ///
    /// `backend` is the full symbolic name, so `openai` and `openai:gpt-4`
    /// never share entries.
    pub fn fingerprint(
        backend: &str,
        payload: &RequestPayload,
        options: &RequestOptions
    ) -> Result<String, StorageError> {
        utils::request_fingerprint(backend, payload, options).map_err(|e| {
            StorageError::SerializationError {
                error_type: "fingerprint".to_string(),
                reason: e.to_string()
            }
        })
    }

    /// Look up a key, counting a hit when found.
    pub async fn fetch(&self, key: &str) -> Option<BackendResult> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(cache_key = key, error = %e, "Result cache read failed");
                return None;
            }
        };

        let result: BackendResult = match serde_json::from_str(&raw) {
            Ok(result) => result,
            Err(e) => {
                warn!(cache_key = key, error = %e, "Dropping undecodable cache entry");
                if let Err(e) = self.store.forget(key).await {
                    warn!(cache_key = key, error = %e, "Failed to drop cache entry");
                }
                return None;
            }
        };

        if let Err(e) = self.store.increment_counter(CacheCounter::Hits).await {
            warn!(cache_key = key, error = %e, "Failed to count cache hit");
        }
        debug!(cache_key = key, "Result cache hit");
        Some(result)
    }

    /// Store a result, register its key and count the store.
    ///
    /// A racing duplicate write for the same key is harmless: last write wins.
    pub async fn store(
        &self,
        key: &str,
        result: &BackendResult,
        ttl: Duration
    ) -> Result<(), StorageError> {
        let encoded =
            serde_json::to_string(result).map_err(|e| StorageError::SerializationError {
                error_type: "BackendResult".to_string(),
                reason: e.to_string()
            })?;

        self.store.put(key, encoded, ttl).await?;
        self.store.register_key(key).await?;
        self.store.increment_counter(CacheCounter::Stores).await?;
        Ok(())
    }

    pub async fn forget(&self, key: &str) -> Result<bool, StorageError> {
        self.store.forget(key).await
    }

    /// Forget every registered entry and reset registry and counters.
    ///
    /// Returns the number of entries actually removed.
    pub async fn flush(&self) -> Result<usize, StorageError> {
        let keys = self.store.registered_keys().await?;
        let mut removed = 0;
        for key in &keys {
            if self.store.forget(key).await? {
                removed += 1;
            }
        }
        self.store.clear_registry().await?;
        self.store.reset_counters().await?;
        debug!(registered = keys.len(), removed, "Flushed result cache");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CacheStats, StorageError> {
        Ok(CacheStats {
            cache_hits: self.store.counter(CacheCounter::Hits).await?,
            cache_stores: self.store.counter(CacheCounter::Stores).await?,
            registered_keys: self.store.registered_keys().await?.len()
        })
    }
}
