//! In-memory query cache with staleness and retention horizons.
//!
//! An entry younger than `stale_after` is served without touching the
//! network. Between `stale_after` and `retain_for` it is still served, but a
//! background refresh is started. After `retain_for` it is gone and the next
//! caller blocks on a fresh fetch.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Debug},
    sync::Arc,
};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::error::FetchError;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Composite cache key: the data source plus the parameters that select a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub source: &'static str,
    pub parts: Vec<String>,
}

impl QueryKey {
    pub fn new<I, S>(source: &'static str, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source)?;
        for part in &self.parts {
            write!(f, "/{part}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    stale_after: TimeDelta,
    retain_for: TimeDelta,
}

impl CachePolicy {
    /// Fails unless `0 <= stale_after <= retain_for`.
    pub fn new(stale_after: TimeDelta, retain_for: TimeDelta) -> anyhow::Result<Self> {
        if stale_after < TimeDelta::zero() || retain_for < TimeDelta::zero() {
            return Err(anyhow::anyhow!("Cache durations must not be negative"));
        }
        if stale_after > retain_for {
            return Err(anyhow::anyhow!(
                "Cache staleness ({}s) must not exceed retention ({}s)",
                stale_after.num_seconds(),
                retain_for.num_seconds()
            ));
        }
        Ok(Self {
            stale_after,
            retain_for,
        })
    }

    pub fn stale_after(&self) -> TimeDelta {
        self.stale_after
    }

    pub fn retain_for(&self) -> TimeDelta {
        self.retain_for
    }
}

/// A remote lookup that can be cached.
#[async_trait]
pub trait Query: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Pure function of the query's parameters.
    fn key(&self) -> QueryKey;

    async fn fetch(&self) -> Result<Self::Output, FetchError>;
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stale_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

enum Lookup<V> {
    Fresh(V),
    Stale(V),
    Missing,
}

struct Inner<V> {
    entries: Mutex<HashMap<QueryKey, Entry<V>>>,
    refreshing: Mutex<HashSet<QueryKey>>,
    background: Mutex<JoinSet<()>>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
}

impl<V: Clone> Inner<V> {
    fn lookup(&self, key: &QueryKey) -> Lookup<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if now >= entry.expires_at => {
                trace!(%key, "cache entry expired");
                entries.remove(key);
                Lookup::Missing
            }
            Some(entry) if now >= entry.stale_at => Lookup::Stale(entry.value.clone()),
            Some(entry) => Lookup::Fresh(entry.value.clone()),
            None => Lookup::Missing,
        }
    }

    /// Insert `value` and drop every entry past its retention horizon.
    fn store(&self, key: QueryKey, value: V) {
        let now = self.clock.now();
        let entry = Entry {
            value,
            stale_at: now + self.policy.stale_after,
            expires_at: now + self.policy.retain_for,
        };

        let mut entries = self.entries.lock();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(key, entry);
    }
}

/// Clears the in-flight mark for a key when its refresh task ends,
/// including by panic or abort.
struct RefreshGuard<V> {
    inner: Arc<Inner<V>>,
    key: QueryKey,
}

impl<V> Drop for RefreshGuard<V> {
    fn drop(&mut self) {
        self.inner.refreshing.lock().remove(&self.key);
    }
}

/// Cache of values of one type, shared by cloning.
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.lock().len())
            .field("policy", &self.inner.policy)
            .field("clock", &self.inner.clock)
            .finish()
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                refreshing: Mutex::new(HashSet::new()),
                background: Mutex::new(JoinSet::new()),
                clock,
                policy,
            }),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.inner.policy
    }

    /// Return the cached value for `query`, fetching it when absent or expired.
    ///
    /// A stale hit returns immediately and schedules one background refresh.
    /// Failed fetches are never stored.
    pub async fn fetch<Q>(&self, query: Q) -> Result<V, FetchError>
    where
        Q: Query<Output = V>,
    {
        let key = query.key();

        match self.inner.lookup(&key) {
            Lookup::Fresh(value) => {
                trace!(%key, "cache hit");
                return Ok(value);
            }
            Lookup::Stale(value) => {
                debug!(%key, "serving stale value, refreshing in background");
                self.spawn_refresh(key, query);
                return Ok(value);
            }
            Lookup::Missing => {}
        }

        debug!(%key, "cache miss");
        let value = query.fetch().await?;
        self.inner.store(key, value.clone());
        Ok(value)
    }

    /// Warm the cache for `query` without handing the value to anyone.
    ///
    /// No-op while the entry is fresh. Failures are logged, not returned.
    pub async fn prefetch<Q>(&self, query: Q)
    where
        Q: Query<Output = V>,
    {
        let key = query.key();
        if let Lookup::Fresh(_) = self.inner.lookup(&key) {
            trace!(%key, "prefetch skipped, entry is fresh");
            return;
        }

        match query.fetch().await {
            Ok(value) => self.inner.store(key, value),
            Err(err) => warn!(%key, error = %err, "prefetch failed"),
        }
    }

    /// Cached value for `key`, if it has not expired. Never fetches.
    pub fn peek(&self, key: &QueryKey) -> Option<V> {
        match self.inner.lookup(key) {
            Lookup::Fresh(value) | Lookup::Stale(value) => Some(value),
            Lookup::Missing => None,
        }
    }

    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().remove(key).is_some()
    }

    /// Drop every entry past its retention horizon, returning how many went.
    pub fn evict_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every background refresh started so far has finished.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *self.inner.background.lock());
        while pending.join_next().await.is_some() {}
    }

    fn spawn_refresh<Q>(&self, key: QueryKey, query: Q)
    where
        Q: Query<Output = V>,
    {
        if !self.inner.refreshing.lock().insert(key.clone()) {
            trace!(%key, "refresh already in flight");
            return;
        }

        let guard = RefreshGuard {
            inner: Arc::clone(&self.inner),
            key,
        };
        let mut background = self.inner.background.lock();
        while background.try_join_next().is_some() {}

        background.spawn(async move {
            let key = &guard.key;
            match query.fetch().await {
                Ok(value) => {
                    debug!(%key, "background refresh stored");
                    guard.inner.store(key.clone(), value);
                }
                Err(err) => {
                    warn!(%key, error = %err, "background refresh failed, keeping cached value")
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct CountingQuery {
        region: String,
        calls: Arc<AtomicUsize>,
        outcome: Arc<Mutex<Result<u32, FetchError>>>,
        panic_next: Arc<AtomicBool>,
    }

    impl CountingQuery {
        fn new(region: impl Into<String>, value: u32) -> Self {
            Self {
                region: region.into(),
                calls: Arc::new(AtomicUsize::new(0)),
                outcome: Arc::new(Mutex::new(Ok(value))),
                panic_next: Arc::new(AtomicBool::new(false)),
            }
        }

        fn panic_on_next_fetch(&self) {
            self.panic_next.store(true, Ordering::SeqCst);
        }

        fn respond_with(&self, outcome: Result<u32, FetchError>) {
            *self.outcome.lock() = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Query for CountingQuery {
        type Output = u32;

        fn key(&self) -> QueryKey {
            QueryKey::new("test", [self.region.as_str()])
        }

        async fn fetch(&self) -> Result<u32, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("upstream client panicked");
            }
            self.outcome.lock().clone()
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn cache(clock: &ManualClock) -> QueryCache<u32> {
        let policy = CachePolicy::new(TimeDelta::hours(1), TimeDelta::hours(24)).unwrap();
        QueryCache::new(policy, Arc::new(clock.clone()))
    }

    #[test]
    fn policy_rejects_staleness_beyond_retention() {
        let err = CachePolicy::new(TimeDelta::hours(2), TimeDelta::hours(1)).unwrap_err();
        assert!(err.to_string().contains("must not exceed retention"));

        assert!(CachePolicy::new(TimeDelta::hours(-1), TimeDelta::hours(1)).is_err());
        assert!(CachePolicy::new(TimeDelta::hours(1), TimeDelta::hours(1)).is_ok());
    }

    #[test]
    fn key_display_joins_parts() {
        let key = QueryKey::new("forecast", ["olympics", "2024-01-15T12:00:00+00:00"]);
        assert_eq!(key.to_string(), "forecast/olympics/2024-01-15T12:00:00+00:00");
    }

    #[tokio::test]
    async fn follows_staleness_and_retention_horizons() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 1);

        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 1);
        assert_eq!(query.calls(), 1);

        // Fresh: no network.
        clock.advance(TimeDelta::minutes(30));
        query.respond_with(Ok(2));
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 1);
        cache.settle().await;
        assert_eq!(query.calls(), 1);

        // Stale: cached value now, exactly one refresh behind it.
        clock.advance(TimeDelta::minutes(60));
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 1);
        cache.settle().await;
        assert_eq!(query.calls(), 2);
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 2);
        assert_eq!(query.calls(), 2);

        // Expired: blocking fetch.
        clock.set(start() + TimeDelta::hours(25) + TimeDelta::minutes(30));
        query.respond_with(Ok(3));
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 3);
        assert_eq!(query.calls(), 3);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched_from_cold() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 1);

        cache.fetch(query.clone()).await.unwrap();
        clock.advance(TimeDelta::hours(25));
        query.respond_with(Ok(9));

        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 9);
        cache.settle().await;
        assert_eq!(query.calls(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_serving_cached_value() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 1);

        cache.fetch(query.clone()).await.unwrap();
        clock.advance(TimeDelta::hours(2));
        query.respond_with(Err(FetchError::transport("http://test", "timeout")));

        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 1);
        cache.settle().await;
        assert_eq!(cache.peek(&query.key()), Some(1));
    }

    #[tokio::test]
    async fn validation_failure_is_not_cached() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 1);
        query.respond_with(Err(ValidationError::missing("objects").into()));

        let err = cache.fetch(query.clone()).await.unwrap_err();
        assert!(err.is_validation());
        assert!(cache.is_empty());

        query.respond_with(Ok(4));
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 4);
        assert_eq!(query.calls(), 2);
    }

    #[tokio::test]
    async fn failure_for_one_key_leaves_others_alone() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let good = CountingQuery::new("olympics", 1);
        let bad = CountingQuery::new("mt-hood", 0);
        bad.respond_with(Err(FetchError::transport("http://test", "503")));

        cache.fetch(good.clone()).await.unwrap();
        assert!(cache.fetch(bad.clone()).await.unwrap_err().is_transport());

        assert_eq!(cache.peek(&good.key()), Some(1));
        assert_eq!(cache.peek(&bad.key()), None);
    }

    #[tokio::test]
    async fn concurrent_stale_hits_start_one_refresh() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 1);

        cache.fetch(query.clone()).await.unwrap();
        clock.advance(TimeDelta::minutes(90));

        // Neither call yields, so the first refresh cannot finish in between.
        let (a, b) = tokio::join!(cache.fetch(query.clone()), cache.fetch(query.clone()));
        assert_eq!((a.unwrap(), b.unwrap()), (1, 1));
        cache.settle().await;
        assert_eq!(query.calls(), 2);
    }

    #[tokio::test]
    async fn expired_keys_do_not_accumulate() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);

        // A month of hourly buckets, each key looked up once.
        for hour in 0..720 {
            let query = CountingQuery::new(format!("bucket-{hour}"), hour);
            cache.fetch(query).await.unwrap();
            clock.advance(TimeDelta::hours(1));
        }

        assert!(cache.len() <= 24, "{} entries retained", cache.len());
        assert_eq!(cache.peek(&QueryKey::new("test", ["bucket-719"])), Some(719));
        assert_eq!(cache.peek(&QueryKey::new("test", ["bucket-600"])), None);
    }

    #[tokio::test]
    async fn panicked_refresh_does_not_block_later_refreshes() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 1);

        cache.fetch(query.clone()).await.unwrap();
        clock.advance(TimeDelta::minutes(90));

        query.panic_on_next_fetch();
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 1);
        cache.settle().await;
        assert_eq!(query.calls(), 2);

        query.respond_with(Ok(5));
        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 1);
        cache.settle().await;
        assert_eq!(query.calls(), 3);
        assert_eq!(cache.peek(&query.key()), Some(5));
    }

    #[tokio::test]
    async fn prefetch_populates_and_is_idempotent() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 7);

        cache.prefetch(query.clone()).await;
        cache.prefetch(query.clone()).await;
        assert_eq!(query.calls(), 1);

        assert_eq!(cache.fetch(query.clone()).await.unwrap(), 7);
        assert_eq!(query.calls(), 1);
    }

    #[tokio::test]
    async fn prefetch_failure_leaves_cache_empty() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let query = CountingQuery::new("olympics", 7);
        query.respond_with(Err(FetchError::transport("http://test", "refused")));

        cache.prefetch(query.clone()).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn evict_and_invalidate() {
        let clock = ManualClock::new(start());
        let cache = cache(&clock);
        let a = CountingQuery::new("a", 1);
        let b = CountingQuery::new("b", 2);

        cache.fetch(a.clone()).await.unwrap();
        clock.advance(TimeDelta::hours(23));
        cache.fetch(b.clone()).await.unwrap();
        assert_eq!(cache.len(), 2);

        clock.advance(TimeDelta::hours(2));
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.peek(&a.key()), None);

        assert!(cache.invalidate(&b.key()));
        assert!(!cache.invalidate(&b.key()));
        assert!(cache.is_empty());
    }
}
