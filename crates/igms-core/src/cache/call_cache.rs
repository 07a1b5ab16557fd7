use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use crate::error::CacheError;

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// A loader is in flight; callers join it.
    Pending,
    /// Loaded and within its freshness window.
    Fresh,
    /// Loaded but past its TTL; the next `resolve` reloads it.
    Stale,
}

/// Snapshot of one cache slot.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    /// `None` while the entry is pending.
    pub value: Option<V>,
    pub created_at: DateTime<Utc>,
    pub state: EntryState,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Freshness window for the loaded value. Falls back to the cache's
    /// default TTL; with neither set the entry lives until invalidated.
    pub ttl: Option<Duration>,
}

impl ResolveOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Anything holding data that must not outlive the current session.
pub trait Invalidate: Send + Sync {
    fn invalidate_all(&self);
}

enum Slot<V> {
    Pending {
        generation: u64,
        started_at: DateTime<Utc>,
        load: SharedLoad<V>,
    },
    Ready {
        value: V,
        created_at: DateTime<Utc>,
        ttl: Option<Duration>,
    },
}

impl<V> Slot<V> {
    fn state(&self, now: DateTime<Utc>) -> EntryState {
        match self {
            Slot::Pending { .. } => EntryState::Pending,
            Slot::Ready { created_at, ttl, .. } => match ttl {
                Some(ttl) if now - *created_at >= *ttl => EntryState::Stale,
                _ => EntryState::Fresh,
            },
        }
    }
}

struct CacheInner<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Distinguishes a pending slot from any later slot for the same key, so a
    /// load that outlived an `invalidate`/`clear` cannot overwrite its successor.
    next_generation: u64,
}

/// Memoizes asynchronous reads by key and coalesces concurrent loads.
///
/// The first `resolve` that finds no valid entry for a key becomes the leader:
/// its loader runs once, and every `resolve` issued before it settles awaits
/// the same shared future and sees the identical outcome. Failures are never
/// stored; the slot is dropped so the next call retries.
///
/// Clone is cheap and clones share the same entries.
pub struct CallCache<K, V> {
    inner: Arc<Mutex<CacheInner<K, V>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Option<Duration>,
}

impl<K, V> Clone for CallCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
            default_ttl: self.default_ttl,
        }
    }
}

impl<K, V> Default for CallCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CallCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_generation: 0,
            })),
            clock,
            default_ttl: None,
        }
    }

    /// TTL applied when `ResolveOptions::ttl` is not set.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<K, V>> {
        lock_inner(&self.inner)
    }

    /// Return the value for `key`, loading it with `loader` if there is no
    /// valid entry. The loader is only called by the leader and only once it
    /// is polled, never while the cache is locked.
    pub async fn resolve<F, Fut>(
        &self,
        key: K,
        loader: F,
        options: ResolveOptions,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let load = {
            let mut inner = self.lock();
            let now = self.clock.now();

            let existing = match inner.entries.get(&key) {
                Some(slot) => match (slot.state(now), slot) {
                    (EntryState::Fresh, Slot::Ready { value, .. }) => {
                        trace!(key = %key, "Cache hit");
                        return Ok(value.clone());
                    }
                    (_, Slot::Pending { load, .. }) => {
                        debug!(key = %key, "Joining in-flight load");
                        Some(load.clone())
                    }
                    _ => {
                        debug!(key = %key, "Cache entry stale, reloading");
                        None
                    }
                },
                None => None,
            };

            match existing {
                Some(load) => load,
                None => {
                    let generation = inner.next_generation;
                    inner.next_generation += 1;

                    let ttl = options.ttl.or(self.default_ttl);
                    let load = self.lead(key.clone(), generation, ttl, loader);
                    inner.entries.insert(
                        key.clone(),
                        Slot::Pending {
                            generation,
                            started_at: now,
                            load: load.clone(),
                        },
                    );
                    debug!(key = %key, generation, "Cache miss, loading");
                    load
                }
            }
        };

        load.await
    }

    fn lead<F, Fut>(
        &self,
        key: K,
        generation: u64,
        ttl: Option<Duration>,
        loader: F,
    ) -> SharedLoad<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);

        async move {
            let outcome = loader().await.map_err(|e| CacheError::Load {
                key: key.to_string(),
                cause: Arc::new(e),
            });

            settle(&inner, clock.as_ref(), &key, generation, ttl, &outcome);

            outcome
        }
        .boxed()
        .shared()
    }

    /// Remove one entry. An in-flight load for it still completes for the
    /// callers already waiting on it but is not stored.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.lock().entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        debug!(count, "Cache cleared");
    }

    /// Drop entries whose TTL has elapsed, returning how many were removed.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, slot| slot.state(now) != EntryState::Stale);
        before - inner.entries.len()
    }

    pub fn state(&self, key: &K) -> Option<EntryState> {
        let now = self.clock.now();
        self.lock().entries.get(key).map(|slot| slot.state(now))
    }

    pub fn peek(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let now = self.clock.now();
        let inner = self.lock();
        let slot = inner.entries.get(key)?;
        let state = slot.state(now);
        Some(match slot {
            Slot::Pending { started_at, .. } => CacheEntry {
                key: key.clone(),
                value: None,
                created_at: *started_at,
                state,
            },
            Slot::Ready {
                value, created_at, ..
            } => CacheEntry {
                key: key.clone(),
                value: Some(value.clone()),
                created_at: *created_at,
                state,
            },
        })
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl<K, V> Invalidate for CallCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate_all(&self) {
        self.clear();
    }
}

/// Store a settled load, unless its slot was invalidated or replaced meanwhile.
fn settle<K, V>(
    inner: &Mutex<CacheInner<K, V>>,
    clock: &dyn Clock,
    key: &K,
    generation: u64,
    ttl: Option<Duration>,
    outcome: &Result<V, CacheError>,
) where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    let mut guard = lock_inner(inner);
    let still_ours = matches!(
        guard.entries.get(key),
        Some(Slot::Pending { generation: g, .. }) if *g == generation
    );
    if !still_ours {
        debug!(key = %key, generation, "Load settled after invalidation, result not cached");
        return;
    }

    match outcome {
        Ok(value) => {
            guard.entries.insert(
                key.clone(),
                Slot::Ready {
                    value: value.clone(),
                    created_at: clock.now(),
                    ttl,
                },
            );
            trace!(key = %key, "Cache entry fresh");
        }
        Err(e) => {
            guard.entries.remove(key);
            debug!(key = %key, error = %e, "Load failed, entry dropped");
        }
    }
}

fn lock_inner<K, V>(inner: &Mutex<CacheInner<K, V>>) -> MutexGuard<'_, CacheInner<K, V>> {
    // Every mutation is a single insert/remove, so a poisoned map is still consistent
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    const KEY: &str = "dept=X&from=2024-01-01&to=2024-01-31";

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: u32,
        delay_ms: u64,
    ) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<u32>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(delay_ms)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing_loader(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<u32>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(10)).await;
                Err(anyhow::anyhow!("network unreachable"))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let cache: CallCache<String, u32> = CallCache::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let first = cache
            .resolve(KEY.to_string(), counting_loader(&a, 7, 0), ResolveOptions::default())
            .await
            .unwrap();
        let second = cache
            .resolve(KEY.to_string(), counting_loader(&b, 99, 0), ResolveOptions::default())
            .await
            .unwrap();

        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 0);
        assert_eq!(cache.state(&KEY.to_string()), Some(EntryState::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resolves_coalesce() {
        let cache: CallCache<String, u32> = CallCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let resolve = |value| {
            cache.resolve(
                KEY.to_string(),
                counting_loader(&calls, value, 50),
                ResolveOptions::default(),
            )
        };
        let (r1, r2, r3, r4) = tokio::join!(resolve(1), resolve(2), resolve(3), resolve(4));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in [r1, r2, r3, r4] {
            assert_eq!(r.unwrap(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_state_while_loading() {
        let cache: CallCache<String, u32> = CallCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = {
            let cache = cache.clone();
            let loader = counting_loader(&calls, 5, 100);
            tokio::spawn(async move {
                cache
                    .resolve(KEY.to_string(), loader, ResolveOptions::default())
                    .await
            })
        };
        tokio::time::sleep(StdDuration::from_millis(10)).await;

        let entry = cache.peek(&KEY.to_string()).unwrap();
        assert_eq!(entry.state, EntryState::Pending);
        assert!(entry.value.is_none());

        assert_eq!(handle.await.unwrap().unwrap(), 5);
        assert_eq!(cache.peek(&KEY.to_string()).unwrap().value, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_callers_and_is_not_cached() {
        let cache: CallCache<String, u32> = CallCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let resolve = || {
            cache.resolve(
                KEY.to_string(),
                failing_loader(&calls),
                ResolveOptions::default(),
            )
        };
        let (r1, r2, r3) = tokio::join!(resolve(), resolve(), resolve());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let errors: Vec<CacheError> = [r1, r2, r3].into_iter().map(|r| r.unwrap_err()).collect();
        for e in &errors {
            assert!(Arc::ptr_eq(
                match e { CacheError::Load { cause, .. } => cause },
                match &errors[0] { CacheError::Load { cause, .. } => cause },
            ));
            assert_eq!(e.key(), KEY);
            assert_eq!(e.cause().to_string(), "network unreachable");
        }
        assert_eq!(cache.state(&KEY.to_string()), None);

        // Retry immediately
        let ok = Arc::new(AtomicUsize::new(0));
        let value = cache
            .resolve(KEY.to_string(), counting_loader(&ok, 3, 0), ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(ok.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache: CallCache<String, u32> = CallCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = KEY.to_string();

        cache.resolve(key.clone(), counting_loader(&calls, 1, 0), ResolveOptions::default()).await.unwrap();
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));

        let value = cache
            .resolve(key.clone(), counting_loader(&calls, 2, 0), ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let cache: CallCache<String, u32> = CallCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for k in ["a", "b", "c"] {
            cache.resolve(k.to_string(), counting_loader(&calls, 1, 0), ResolveOptions::default()).await.unwrap();
        }
        assert_eq!(cache.len(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_expiry_with_manual_clock() {
        let clock = ManualClock::default();
        let cache: CallCache<String, u32> = CallCache::with_clock(Arc::new(clock.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = KEY.to_string();
        let opts = ResolveOptions::with_ttl(Duration::minutes(5));

        cache.resolve(key.clone(), counting_loader(&calls, 1, 0), opts).await.unwrap();

        clock.advance(Duration::minutes(4));
        let within = cache.resolve(key.clone(), counting_loader(&calls, 2, 0), opts).await.unwrap();
        assert_eq!(within, 1);

        clock.advance(Duration::minutes(2));
        assert_eq!(cache.state(&key), Some(EntryState::Stale));
        let after = cache.resolve(key.clone(), counting_loader(&calls, 3, 0), opts).await.unwrap();
        assert_eq!(after, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_default_ttl_and_purge() {
        let clock = ManualClock::default();
        let cache: CallCache<String, u32> =
            CallCache::with_clock(Arc::new(clock.clone())).with_default_ttl(Some(Duration::seconds(30)));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.resolve("short".to_string(), counting_loader(&calls, 1, 0), ResolveOptions::default()).await.unwrap();
        cache
            .resolve("long".to_string(), counting_loader(&calls, 2, 0), ResolveOptions::with_ttl(Duration::hours(1)))
            .await
            .unwrap();

        clock.advance(Duration::seconds(31));
        assert_eq!(cache.purge_stale(), 1);
        assert_eq!(cache.state(&"short".to_string()), None);
        assert_eq!(cache.state(&"long".to_string()), Some(EntryState::Fresh));
    }

    #[tokio::test]
    async fn test_no_ttl_never_goes_stale() {
        let clock = ManualClock::default();
        let cache: CallCache<String, u32> = CallCache::with_clock(Arc::new(clock.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.resolve("k".to_string(), counting_loader(&calls, 1, 0), ResolveOptions::default()).await.unwrap();
        clock.advance(Duration::days(365));
        assert_eq!(cache.state(&"k".to_string()), Some(EntryState::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_settling_after_invalidate_is_not_stored() {
        let cache: CallCache<String, u32> = CallCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = KEY.to_string();

        let in_flight = {
            let cache = cache.clone();
            let loader = counting_loader(&calls, 1, 100);
            let key = key.clone();
            tokio::spawn(async move { cache.resolve(key, loader, ResolveOptions::default()).await })
        };
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        cache.clear();

        // New leader for the same key while the old load is still running
        let fresh = cache.resolve(key.clone(), counting_loader(&calls, 2, 200), ResolveOptions::default());
        let (old, new) = tokio::join!(in_flight, fresh);

        // The old load still completes for its caller
        assert_eq!(old.unwrap().unwrap(), 1);
        assert_eq!(new.unwrap(), 2);
        assert_eq!(cache.peek(&key).unwrap().value, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
