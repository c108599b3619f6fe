use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::{
    config::CountingConfig,
    counter::{CounterDelta, CounterStore},
    dedup::{DedupKey, DedupWindowCache},
    error::CoreError,
    visitor::VisitorToken,
};

/// What a single [`VisitCounterService::record_visit`] call decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitOutcome {
    pub inc_pv: bool,
    pub inc_uv: bool,
    /// `false` when an increment was due but the store write failed or timed out.
    pub persisted: bool,
}

impl VisitOutcome {
    pub fn delta(&self) -> Option<CounterDelta> {
        CounterDelta::from_flags(self.inc_pv, self.inc_uv)
    }
}

/// Decides, per page view, whether the PV and UV counters move.
///
/// PV is gated by a short window keyed on (visitor, path); UV by a
/// calendar-day window keyed on (visitor, day, path). Both gates go through
/// the injected [`DedupWindowCache`]; the resulting change is written to the
/// injected [`CounterStore`] as one increment.
///
/// Counting is best-effort: every cache and store call is bounded by
/// `call_timeout`, a failing cache is treated as "not yet counted" and a
/// failing store write is logged and dropped. `record_visit` never fails.
pub struct VisitCounterService {
    cache: Arc<dyn DedupWindowCache>,
    store: Arc<dyn CounterStore>,
    config: CountingConfig,
}

impl VisitCounterService {
    pub fn new(
        cache: Arc<dyn DedupWindowCache>,
        store: Arc<dyn CounterStore>,
        config: CountingConfig,
    ) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    /// Record one rendered view of `resource_id` at `path` by `token`.
    ///
    /// `today` selects the UV window; pass the current UTC date.
    pub async fn record_visit(
        &self,
        resource_id: i64,
        token: &VisitorToken,
        path: &str,
        today: NaiveDate,
    ) -> VisitOutcome {
        let pv_key = DedupKey::page_view(token, path);
        let uv_key = DedupKey::unique_visitor(token, path, today);

        let (inc_pv, inc_uv) = tokio::join!(
            self.mark(&pv_key, self.config.pv_window),
            self.mark(&uv_key, self.config.uv_window),
        );

        let mut outcome = VisitOutcome {
            inc_pv,
            inc_uv,
            persisted: true,
        };

        // Nothing new in either window: no store round trip at all.
        let Some(delta) = outcome.delta() else {
            return outcome;
        };

        outcome.persisted = self.increment(resource_id, delta).await;
        outcome
    }

    /// Check-and-mark with fail-open semantics.
    async fn mark(&self, key: &DedupKey, ttl: Duration) -> bool {
        match self.try_mark(key, ttl).await {
            Ok(is_new) => is_new,
            Err(e) => {
                warn!(
                    scope = key.scope.label(),
                    timeout_ms = self.timeout_ms(),
                    error = %e,
                    "Dedup check failed, counting visit"
                );
                true
            }
        }
    }

    async fn try_mark(&self, key: &DedupKey, ttl: Duration) -> Result<bool, CoreError> {
        tokio::time::timeout(self.config.call_timeout, self.cache.check_and_mark(key, ttl))
            .await
            .map_err(|_| CoreError::CacheTimeout)?
            .map_err(|e| CoreError::CacheUnavailable(format!("{e:#}")))
    }

    /// Issue the increment once. Increments are not idempotent, so a failed
    /// write is logged and never retried.
    async fn increment(&self, resource_id: i64, delta: CounterDelta) -> bool {
        match self.write(resource_id, delta).await {
            Ok(()) => {
                debug!(resource_id, pv = delta.pv, uv = delta.uv, "Visit counted");
                true
            }
            Err(e) => {
                warn!(
                    resource_id,
                    timeout_ms = self.timeout_ms(),
                    error = %e,
                    "Counter increment failed, visit dropped"
                );
                false
            }
        }
    }

    async fn write(&self, resource_id: i64, delta: CounterDelta) -> Result<(), CoreError> {
        tokio::time::timeout(
            self.config.call_timeout,
            self.store.atomic_increment(resource_id, delta),
        )
        .await
        .map_err(|_| CoreError::StoreTimeout)?
        .map_err(|e| match e.downcast::<CoreError>() {
            Ok(core) => core,
            Err(other) => CoreError::StoreUnavailable(format!("{other:#}")),
        })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.call_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::counter::{ContentCounters, InMemoryCounterStore};
    use crate::dedup::InMemoryDedupCache;
    use crate::visitor::resolve;

    const POST: i64 = 42;
    const PATH: &str = "/post/42/";

    /// Wraps the in-memory store and counts write calls.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryCounterStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn atomic_increment(
            &self,
            resource_id: i64,
            delta: CounterDelta,
        ) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.atomic_increment(resource_id, delta).await
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl DedupWindowCache for BrokenCache {
        async fn set_if_absent(&self, _key: &str, _ttl: Duration) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused")
        }
    }

    struct StalledCache;

    #[async_trait]
    impl DedupWindowCache for StalledCache {
        async fn set_if_absent(&self, _key: &str, _ttl: Duration) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(false)
        }
    }

    struct StalledStore;

    #[async_trait]
    impl CounterStore for StalledStore {
        async fn atomic_increment(&self, _id: i64, _delta: CounterDelta) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn atomic_increment(&self, _id: i64, _delta: CounterDelta) -> anyhow::Result<()> {
            anyhow::bail!("database is locked")
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    async fn setup() -> (VisitCounterService, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        store.inner.insert(POST).await;
        let service = VisitCounterService::new(
            Arc::new(InMemoryDedupCache::new()),
            store.clone(),
            CountingConfig::default(),
        );
        (service, store)
    }

    async fn counters(store: &RecordingStore) -> ContentCounters {
        store.inner.get(POST).await.expect("post registered")
    }

    #[tokio::test(start_paused = true)]
    async fn first_visit_bumps_both_counters_in_one_write() {
        let (service, store) = setup().await;
        let visitor = resolve(None).token;

        let outcome = service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 1))
            .await;

        assert!(outcome.inc_pv && outcome.inc_uv && outcome.persisted);
        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_views_inside_pv_window_do_not_write() {
        let (service, store) = setup().await;
        let visitor = resolve(None).token;
        let today = day(2024, 5, 1);

        for _ in 0..10 {
            service.record_visit(POST, &visitor, PATH, today).await;
            tokio::time::advance(Duration::from_secs(5)).await;
        }

        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pv_counts_again_after_window_but_uv_waits_for_next_day() {
        let (service, store) = setup().await;
        let visitor = resolve(None).token;
        let today = day(2024, 5, 1);

        service.record_visit(POST, &visitor, PATH, today).await;
        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        let outcome = service.record_visit(POST, &visitor, PATH, today).await;

        assert!(outcome.inc_pv);
        assert!(!outcome.inc_uv);
        assert_eq!(counters(&store).await, ContentCounters { pv: 2, uv: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn uv_counts_again_when_the_day_rolls_over() {
        let (service, store) = setup().await;
        let visitor = resolve(None).token;

        service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 1))
            .await;
        // Still inside the PV window: only the new day's UV key is fresh.
        tokio::time::advance(Duration::from_secs(10)).await;
        let outcome = service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 2))
            .await;

        assert!(!outcome.inc_pv);
        assert!(outcome.inc_uv);
        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn morning_scenario_with_two_visitors() {
        let (service, store) = setup().await;
        let a = resolve(None).token;
        let b = resolve(None).token;
        let today = day(2024, 5, 1);

        // 10:00:00
        service.record_visit(POST, &a, PATH, today).await;
        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });

        // 10:00:30
        tokio::time::advance(Duration::from_secs(30)).await;
        service.record_visit(POST, &a, PATH, today).await;
        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });

        // 10:02:00
        tokio::time::advance(Duration::from_secs(90)).await;
        service.record_visit(POST, &a, PATH, today).await;
        assert_eq!(counters(&store).await, ContentCounters { pv: 2, uv: 1 });

        // 10:02:30
        tokio::time::advance(Duration::from_secs(30)).await;
        service.record_visit(POST, &b, PATH, today).await;
        assert_eq!(counters(&store).await, ContentCounters { pv: 3, uv: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn different_paths_are_counted_separately() {
        let (service, store) = setup().await;
        let visitor = resolve(None).token;
        let today = day(2024, 5, 1);

        service.record_visit(POST, &visitor, PATH, today).await;
        service
            .record_visit(POST, &visitor, "/post/42/?page=2", today)
            .await;

        assert_eq!(counters(&store).await, ContentCounters { pv: 2, uv: 2 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_visits_from_one_visitor_count_once() {
        let (service, store) = setup().await;
        let service = Arc::new(service);
        let visitor = resolve(None).token;
        let today = day(2024, 5, 1);

        let mut handles = Vec::new();
        for _ in 0..100 {
            let service = Arc::clone(&service);
            let visitor = visitor.clone();
            handles.push(tokio::spawn(async move {
                service.record_visit(POST, &visitor, PATH, today).await
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broken_cache_fails_open() {
        let store = Arc::new(RecordingStore::default());
        store.inner.insert(POST).await;
        let service = VisitCounterService::new(
            Arc::new(BrokenCache),
            store.clone(),
            CountingConfig::default(),
        );
        let visitor = resolve(None).token;

        let outcome = service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 1))
            .await;

        assert!(outcome.inc_pv && outcome.inc_uv);
        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_cache_times_out_and_fails_open() {
        let store = Arc::new(RecordingStore::default());
        store.inner.insert(POST).await;
        let service = VisitCounterService::new(
            Arc::new(StalledCache),
            store.clone(),
            CountingConfig::default(),
        );
        let visitor = resolve(None).token;

        let started = tokio::time::Instant::now();
        let outcome = service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 1))
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(outcome.inc_pv && outcome.inc_uv && outcome.persisted);
        assert_eq!(counters(&store).await, ContentCounters { pv: 1, uv: 1 });
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let service = VisitCounterService::new(
            Arc::new(InMemoryDedupCache::new()),
            Arc::new(BrokenStore),
            CountingConfig::default(),
        );
        let visitor = resolve(None).token;

        let outcome = service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 1))
            .await;

        assert!(outcome.inc_pv && outcome.inc_uv);
        assert!(!outcome.persisted);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_without_persisting() {
        let service = VisitCounterService::new(
            Arc::new(InMemoryDedupCache::new()),
            Arc::new(StalledStore),
            CountingConfig::default(),
        );
        let visitor = resolve(None).token;

        let started = tokio::time::Instant::now();
        let outcome = service
            .record_visit(POST, &visitor, PATH, day(2024, 5, 1))
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(outcome.inc_pv && outcome.inc_uv);
        assert!(!outcome.persisted);
    }

    #[tokio::test]
    async fn cache_and_store_failures_map_to_core_errors() {
        let service = VisitCounterService::new(
            Arc::new(BrokenCache),
            Arc::new(BrokenStore),
            CountingConfig::default(),
        );
        let key = DedupKey::page_view(&resolve(None).token, PATH);

        let cache_err = service
            .try_mark(&key, Duration::from_secs(60))
            .await
            .expect_err("broken cache");
        assert!(matches!(
            cache_err,
            CoreError::CacheUnavailable(ref msg) if msg.contains("connection refused")
        ));

        let store_err = service
            .write(POST, CounterDelta { pv: 1, uv: 0 })
            .await
            .expect_err("broken store");
        assert!(matches!(
            store_err,
            CoreError::StoreUnavailable(ref msg) if msg.contains("database is locked")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_map_to_core_errors() {
        let service = VisitCounterService::new(
            Arc::new(StalledCache),
            Arc::new(StalledStore),
            CountingConfig::default(),
        );
        let key = DedupKey::page_view(&resolve(None).token, PATH);

        let cache_err = service
            .try_mark(&key, Duration::from_secs(60))
            .await
            .expect_err("stalled cache");
        assert!(matches!(cache_err, CoreError::CacheTimeout));

        let store_err = service
            .write(POST, CounterDelta { pv: 1, uv: 0 })
            .await
            .expect_err("stalled store");
        assert!(matches!(store_err, CoreError::StoreTimeout));
    }

    #[tokio::test]
    async fn missing_resource_keeps_its_error() {
        let service = VisitCounterService::new(
            Arc::new(InMemoryDedupCache::new()),
            Arc::new(InMemoryCounterStore::default()),
            CountingConfig::default(),
        );

        let err = service
            .write(POST, CounterDelta { pv: 1, uv: 1 })
            .await
            .expect_err("unknown resource");
        assert!(matches!(err, CoreError::ResourceNotFound(POST)));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_new_means_no_store_call() {
        let (service, store) = setup().await;
        let visitor = resolve(None).token;
        let today = day(2024, 5, 1);

        service.record_visit(POST, &visitor, PATH, today).await;
        let outcome = service.record_visit(POST, &visitor, PATH, today).await;

        assert_eq!(outcome.delta(), None);
        assert!(outcome.persisted);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }
}
