use std::sync::Arc;

use tracing::{debug, info};

use pagecount_core::{
    config::Config,
    dedup::{DedupWindowCache, InMemoryDedupCache},
    service::VisitCounterService,
};
use pagecount_duckdb::DuckDbBackend;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// PV/UV counting, wired to the dedup cache and to `db` as counter store.
    pub counter: Arc<VisitCounterService>,

    /// Set when the dedup cache is the process-local one, so the sweep loop
    /// can reclaim expired marks. Redis expires keys on its own.
    memory_cache: Option<Arc<InMemoryDedupCache>>,
}

impl AppState {
    /// Construct state backed by a process-local dedup cache.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let cache = Arc::new(InMemoryDedupCache::new());
        let mut state = Self::with_cache(db, config, cache.clone());
        state.memory_cache = Some(cache);
        state
    }

    /// Construct state around an externally provided dedup cache.
    pub fn with_cache(
        db: DuckDbBackend,
        config: Config,
        cache: Arc<dyn DedupWindowCache>,
    ) -> Self {
        let db = Arc::new(db);
        let counter = VisitCounterService::new(cache, db.clone(), config.counting());
        Self {
            db,
            config: Arc::new(config),
            counter: Arc::new(counter),
            memory_cache: None,
        }
    }

    /// Insert the posts listed in `PAGECOUNT_SEED_POSTS` that do not exist
    /// yet. Existing rows and their counters are left alone.
    pub async fn seed_configured_posts(&self) -> anyhow::Result<usize> {
        if self.config.seed_posts.is_empty() {
            return Ok(0);
        }
        let inserted = self.db.seed_posts(&self.config.seed_posts).await?;
        info!(
            configured = self.config.seed_posts.len(),
            inserted, "Seed posts applied"
        );
        Ok(inserted)
    }

    /// Drop expired marks from the process-local dedup cache, if one is used.
    pub async fn sweep_dedup_cache(&self) -> usize {
        match &self.memory_cache {
            Some(cache) => cache.purge_expired().await,
            None => 0,
        }
    }

    /// Background loop: sweep the in-memory dedup cache on a fixed interval.
    ///
    /// Spawned as a `tokio::spawn` task in `main.rs`. Returns immediately when
    /// the cache is external.
    pub async fn run_cache_sweep_loop(self: Arc<Self>) {
        if self.memory_cache.is_none() {
            return;
        }
        let mut ticker = tokio::time::interval(self.config.cache_sweep_interval());
        loop {
            ticker.tick().await;
            let purged = self.sweep_dedup_cache().await;
            if purged > 0 {
                debug!(purged, "Expired dedup marks swept");
            }
        }
    }
}
