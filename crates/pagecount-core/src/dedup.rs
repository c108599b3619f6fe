use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::visitor::VisitorToken;

/// Window a [`DedupKey`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupScope {
    /// Short fixed window gating page views.
    PvWindow,
    /// Calendar-day window gating unique visitors. The day is part of the
    /// key, so a new day never collides with yesterday's marks.
    UvWindow { day: NaiveDate },
}

impl DedupScope {
    pub fn label(&self) -> &'static str {
        match self {
            DedupScope::PvWindow => "pv",
            DedupScope::UvWindow { .. } => "uv",
        }
    }
}

/// "This visitor has been counted for this path in this window."
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub token: VisitorToken,
    pub path: String,
    pub scope: DedupScope,
}

impl DedupKey {
    pub fn page_view(token: &VisitorToken, path: &str) -> Self {
        Self {
            token: token.clone(),
            path: path.to_string(),
            scope: DedupScope::PvWindow,
        }
    }

    pub fn unique_visitor(token: &VisitorToken, path: &str, day: NaiveDate) -> Self {
        Self {
            token: token.clone(),
            path: path.to_string(),
            scope: DedupScope::UvWindow { day },
        }
    }

    /// Render as the flat string stored in the cache backend.
    ///
    /// `pv:{token}:{path}` or `uv:{token}:{YYYY-MM-DD}:{path}`.
    pub fn cache_key(&self) -> String {
        match self.scope {
            DedupScope::PvWindow => format!("pv:{}:{}", self.token, self.path),
            DedupScope::UvWindow { day } => {
                format!("uv:{}:{}:{}", self.token, day.format("%Y-%m-%d"), self.path)
            }
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Shared key/value store with per-key expiry, used to remember which
/// (visitor, path, window) triples were already counted.
///
/// Implementations back [`set_if_absent`](Self::set_if_absent) with a single
/// atomic primitive of the underlying store. A separate read followed by a
/// write lets two concurrent requests both see the key as absent and
/// double-count.
#[async_trait]
pub trait DedupWindowCache: Send + Sync + 'static {
    /// Store `key` with a `ttl` expiry only if it is absent (or expired).
    ///
    /// Returns `true` when this call performed the set.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Returns `true` exactly once per key per `ttl` window and marks the
    /// key on that call.
    async fn check_and_mark(&self, key: &DedupKey, ttl: Duration) -> anyhow::Result<bool> {
        self.set_if_absent(&key.cache_key(), ttl).await
    }
}

/// Process-local [`DedupWindowCache`].
///
/// Maps each key to its expiry instant. The lookup and the insert happen
/// under one lock acquisition, which is what makes `set_if_absent` atomic.
/// Expired entries read as absent; [`purge_expired`](Self::purge_expired)
/// reclaims their memory and is driven by a background loop in the server.
///
/// Uses `tokio::time::Instant` so a paused test clock drives the windows.
#[derive(Default)]
pub struct InMemoryDedupCache {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DedupWindowCache for InMemoryDedupCache {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if entries.get(key).is_some_and(|expires_at| *expires_at > now) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}
