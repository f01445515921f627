use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

/// Redis-backed JSON cache. Without a connection every call is a no-op,
/// so callers never branch on whether Redis is configured.
#[derive(Clone, Default)]
pub struct CacheService {
    redis: Option<ConnectionManager>,
}

impl CacheService {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis: Some(redis) }
    }

    pub fn disabled() -> Self {
        Self { redis: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.redis.clone()?;
        let result: Option<String> = conn.get(key).await.ok()?;
        result.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };
        if let Ok(json) = serde_json::to_string(value) {
            if let Err(e) = conn.set_ex::<_, _, ()>(key, json, ttl_secs).await {
                tracing::warn!("Cache write for '{}' failed: {}", key, e);
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            tracing::warn!("Cache invalidation for '{}' failed: {}", key, e);
        }
    }
}
