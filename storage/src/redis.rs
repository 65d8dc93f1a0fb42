use async_trait::async_trait;
use errors::StorageError;
use orch_core::{CACHE_KEY_REGISTRY, CacheCounter, CacheStore};
use redis::AsyncCommands;
use std::time::Duration;

const BACKEND: &str = "Redis";

/// Largest `EX` Redis accepts; its expiry is kept in milliseconds.
const MAX_EXPIRE_SECONDS: u64 = (i64::MAX / 1000) as u64;

fn query_error(e: redis::RedisError) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        reason: e.to_string(),
    }
}

/// Cache store shared between processes through Redis.
///
/// Entries are plain `SET EX` strings, the key registry is the
/// `ai:cache.keys` set and the counters are `INCR` integers, so several
/// orchestrator instances see one cache and one set of statistics.
pub struct RedisCacheStore {
    connection_manager: redis::aio::ConnectionManager,
}

impl RedisCacheStore {
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(connection_string).map_err(|e| StorageError::ConnectionError {
                backend: BACKEND.to_string(),
                reason: e.to_string(),
            })?;

        let connection_manager =
            client
                .get_connection_manager()
                .await
                .map_err(|e| StorageError::ConnectionError {
                    backend: BACKEND.to_string(),
                    reason: e.to_string(),
                })?;

        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection_manager.clone();
        conn.get(key).await.map_err(query_error)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.connection_manager.clone();
        let seconds = ttl.as_secs().max(1);
        if seconds > MAX_EXPIRE_SECONDS {
            return conn.set(key, value).await.map_err(query_error);
        }
        conn.set_ex(key, value, seconds).await.map_err(query_error)
    }

    async fn forget(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection_manager.clone();
        let removed: usize = conn.del(key).await.map_err(query_error)?;
        Ok(removed > 0)
    }

    async fn register_key(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.connection_manager.clone();
        let _: usize = conn
            .sadd(CACHE_KEY_REGISTRY, key)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn registered_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut conn = self.connection_manager.clone();
        let mut keys: Vec<String> = conn.smembers(CACHE_KEY_REGISTRY).await.map_err(query_error)?;
        keys.sort();
        Ok(keys)
    }

    async fn clear_registry(&self) -> Result<(), StorageError> {
        let mut conn = self.connection_manager.clone();
        let _: usize = conn.del(CACHE_KEY_REGISTRY).await.map_err(query_error)?;
        Ok(())
    }

    async fn increment_counter(&self, counter: CacheCounter) -> Result<u64, StorageError> {
        let mut conn = self.connection_manager.clone();
        conn.incr(counter.key(), 1u64).await.map_err(query_error)
    }

    async fn counter(&self, counter: CacheCounter) -> Result<u64, StorageError> {
        let mut conn = self.connection_manager.clone();
        let value: Option<u64> = conn.get(counter.key()).await.map_err(query_error)?;
        Ok(value.unwrap_or(0))
    }

    async fn reset_counters(&self) -> Result<(), StorageError> {
        let mut conn = self.connection_manager.clone();
        let keys: Vec<&str> = CacheCounter::ALL.iter().map(|c| c.key()).collect();
        let _: usize = conn.del(keys).await.map_err(query_error)?;
        Ok(())
    }
}
