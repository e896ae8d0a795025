use redis::AsyncCommands;
use tracing::debug;

/// Best-effort TTL cache over Redis.
///
/// Every operation swallows backend errors: a get becomes a miss, writes
/// and deletes report success. No caller may fail because Redis is down,
/// and a missing URL disables the layer entirely.
#[derive(Clone)]
pub struct CacheLayer {
    client: Option<redis::Client>,
}

impl CacheLayer {
    pub fn connect(url: Option<&str>) -> Self {
        let client = match url {
            Some(url) => match redis::Client::open(url) {
                Ok(client) => Some(client),
                Err(e) => {
                    debug!("cache disabled, invalid redis url: {e}");
                    None
                }
            },
            None => None,
        };
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn conn(&self) -> Option<redis::aio::MultiplexedConnection> {
        match &self.client {
            Some(client) => match client.get_multiplexed_async_connection().await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    debug!("cache unreachable: {e}");
                    None
                }
            },
            None => None,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!("cache get {key} failed: {e}");
                None
            }
        }
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) {
        if let Some(mut conn) = self.conn().await {
            if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await {
                debug!("cache set {key} failed: {e}");
            }
        }
    }

    pub async fn del(&self, key: &str) {
        if let Some(mut conn) = self.conn().await {
            if let Err(e) = conn.del::<_, ()>(key).await {
                debug!("cache del {key} failed: {e}");
            }
        }
    }

    /// KEYS-based glob invalidation. Key cardinality here is small
    /// (search result pages), so KEYS is acceptable.
    pub async fn del_glob(&self, pattern: &str) {
        if let Some(mut conn) = self.conn().await {
            let keys: Vec<String> = match conn.keys(pattern).await {
                Ok(keys) => keys,
                Err(e) => {
                    debug!("cache keys {pattern} failed: {e}");
                    return;
                }
            };
            if keys.is_empty() {
                return;
            }
            if let Err(e) = conn.del::<_, ()>(keys).await {
                debug!("cache del_glob {pattern} failed: {e}");
            }
        }
    }

    /// Fixed-window counter for rate limiting. `None` when the backend is
    /// unavailable, so limiters fail open.
    pub async fn incr_window(&self, key: &str, window_seconds: i64) -> Option<i64> {
        let mut conn = self.conn().await?;
        let result: Result<(i64,), redis::RedisError> = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await;
        match result {
            Ok((count,)) => Some(count),
            Err(e) => {
                debug!("cache incr {key} failed: {e}");
                None
            }
        }
    }
}

pub fn notifications_key(user_id: uuid::Uuid) -> String {
    format!("notifications:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_is_a_noop() {
        let cache = CacheLayer::disabled();
        assert!(!cache.is_enabled());
        cache.set_ex("k", "v", 60).await;
        assert_eq!(cache.get("k").await, None);
        cache.del("k").await;
        cache.del_glob("search:*").await;
        assert_eq!(cache.incr_window("rl", 60).await, None);
    }

    #[tokio::test]
    async fn unreachable_backend_degrades_to_miss() {
        // Nothing listens here; every call must still return.
        let cache = CacheLayer::connect(Some("redis://127.0.0.1:1"));
        assert!(cache.is_enabled());
        cache.set_ex("k", "v", 60).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.incr_window("rl", 60).await, None);
    }
}
