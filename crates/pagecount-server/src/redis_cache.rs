use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bb8_redis::{bb8, redis::cmd, RedisConnectionManager};
use tracing::{debug, info};

use pagecount_core::dedup::DedupWindowCache;

/// Redis-backed [`DedupWindowCache`], shared by every server instance that
/// points at the same Redis.
///
/// `set_if_absent` is a single `SET key 1 NX PX <ttl>`: Redis performs the
/// existence check and the write as one command, so concurrent requests from
/// different processes still see at most one winner per window.
#[derive(Debug, Clone)]
pub struct RedisDedupCache {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl RedisDedupCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let manager = RedisConnectionManager::new(redis_url)?;
        let pool = bb8::Pool::builder()
            .max_size(32)
            .connection_timeout(Duration::from_secs(2))
            .build(manager)
            .await
            .with_context(|| format!("Failed to connect to Redis at {redis_url}"))?;
        info!("Connected to Redis dedup cache at {}", redis_url);
        Ok(Self { pool })
    }
}

/// `SET ... NX` answers `OK` when it wrote the key and nil when it did not.
fn was_set(reply: Option<String>) -> bool {
    reply.is_some()
}

#[async_trait]
impl DedupWindowCache for RedisDedupCache {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get Redis connection")?;
        // PX rejects 0; clamp so a sub-millisecond TTL still expires promptly.
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to execute SET NX for key: {key}"))?;
        let set = was_set(reply);
        debug!(key, set, "redis set-if-absent ok");
        Ok(set)
    }
}
