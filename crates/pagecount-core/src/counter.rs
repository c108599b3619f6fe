use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::CoreError;

/// Cumulative per-resource counters. Never decremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentCounters {
    pub pv: i64,
    pub uv: i64,
}

/// Amounts to add in one increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub pv: i64,
    pub uv: i64,
}

impl CounterDelta {
    /// Delta for the given dedup decisions. `None` when nothing changes.
    pub fn from_flags(inc_pv: bool, inc_uv: bool) -> Option<Self> {
        if !inc_pv && !inc_uv {
            return None;
        }
        Some(Self {
            pv: i64::from(inc_pv),
            uv: i64::from(inc_uv),
        })
    }
}

/// Durable storage of per-resource `(pv, uv)` pairs.
///
/// The only write is [`atomic_increment`](Self::atomic_increment), which must
/// be a single `column = column + delta` update on the resource's row. A
/// read-modify-write round trip would lose updates under concurrent visits.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    async fn atomic_increment(&self, resource_id: i64, delta: CounterDelta) -> anyhow::Result<()>;
}

/// In-process [`CounterStore`] keyed by resource id.
///
/// Resources must be registered with [`insert`](Self::insert) before they can
/// be incremented, matching the "row exists" precondition of a table update.
#[derive(Default)]
pub struct InMemoryCounterStore {
    rows: Mutex<HashMap<i64, ContentCounters>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zero-initialised resource. Existing counters are kept.
    pub async fn insert(&self, resource_id: i64) {
        self.rows.lock().await.entry(resource_id).or_default();
    }

    pub async fn get(&self, resource_id: i64) -> Option<ContentCounters> {
        self.rows.lock().await.get(&resource_id).copied()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn atomic_increment(&self, resource_id: i64, delta: CounterDelta) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&resource_id)
            .ok_or(CoreError::ResourceNotFound(resource_id))?;
        row.pv += delta.pv;
        row.uv += delta.uv;
        Ok(())
    }
}
