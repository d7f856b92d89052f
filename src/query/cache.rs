//! The query cache engine.
//!
//! Every entry lives in one mutex-protected table. The lock is never held
//! across an await: fetches run on spawned tasks and re-enter the table only
//! to apply their result. Subscriber notifications are sent while the lock is
//! held, so each subscriber sees changes in the order they were applied.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::QueryCacheConfig;
use super::error::QueryError;
use super::handle::QueryHandle;
use super::keys::{IntoQueryKey, QueryKey};
use super::lock::mutex_lock;
use super::state::{
    FetchError, Fetcher, Payload, QueryEntry, QueryState, QueryStatus, RawSnapshot, Subscriber,
    SubscriberId,
};

const SOURCE: &str = "query::cache";

const METRIC_FETCH_TOTAL: &str = "folio_query_fetch_total";
const METRIC_FETCH_FAILED_TOTAL: &str = "folio_query_fetch_failed_total";
const METRIC_FETCH_DISCARDED_TOTAL: &str = "folio_query_fetch_discarded_total";
const METRIC_FETCH_MS: &str = "folio_query_fetch_ms";
const METRIC_HIT_TOTAL: &str = "folio_query_hit_total";
const METRIC_INVALIDATED_TOTAL: &str = "folio_query_invalidated_total";
const METRIC_EVICT_TOTAL: &str = "folio_query_evict_total";
const METRIC_ENTRIES: &str = "folio_query_entries";
const METRIC_MUTATION_TOTAL: &str = "folio_mutation_total";
const METRIC_MUTATION_MS: &str = "folio_mutation_ms";

/// Per-subscription options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// A disabled subscription never triggers a fetch.
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl QueryOptions {
    pub fn enabled_if(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

/// Process-wide cache of asynchronous query results.
///
/// Cloning yields another reference to the same cache.
#[derive(Clone)]
pub struct QueryCache {
    shared: Arc<Shared>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.shared.config)
            .field("entries", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

pub(crate) struct Shared {
    config: QueryCacheConfig,
    runtime: Handle,
    next_subscriber: AtomicU64,
    next_gc_token: AtomicU64,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, QueryEntry>,
    disposed: bool,
}

impl QueryCache {
    /// Create a cache bound to the current tokio runtime.
    pub fn init(config: QueryCacheConfig) -> Result<Self, QueryError> {
        let runtime = Handle::try_current().map_err(|_| QueryError::NoRuntime)?;
        debug!(gc_idle_ms = config.gc_idle_ms, "Query cache initialised");
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                runtime,
                next_subscriber: AtomicU64::new(1),
                next_gc_token: AtomicU64::new(1),
                state: Mutex::new(CacheState::default()),
            }),
        })
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.shared.config
    }

    /// Register interest in `key`.
    ///
    /// Fetches once when the entry is missing, failed or stale and the
    /// subscription is enabled; concurrent subscribers share that fetch.
    pub fn subscribe<T, E, F, Fut>(
        &self,
        key: impl IntoQueryKey,
        fetch: F,
        options: QueryOptions,
    ) -> Result<QueryHandle<T>, QueryError>
    where
        T: Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.into_query_key()?;
        let fetcher: Fetcher = Arc::new(move || {
            let pending = fetch();
            async move {
                pending
                    .await
                    .map(|value| Arc::new(value) as Payload)
                    .map_err(|err| Arc::new(err) as FetchError)
            }
            .boxed()
        });

        let (id, rx) = self.shared.subscribe(&key, fetcher, options.enabled)?;
        Ok(QueryHandle::new(
            Arc::downgrade(&self.shared),
            key,
            id,
            options.enabled,
            rx,
        ))
    }

    /// Equivalent to dropping the handle.
    pub fn unsubscribe<T>(&self, handle: QueryHandle<T>) {
        drop(handle);
    }

    /// Mark every entry equal to or prefixed by `prefix` stale.
    ///
    /// Observed entries refetch now, or right after a fetch that is already
    /// running lands; the rest refetch on their next subscription. Returns the number of matching entries.
    pub fn invalidate(&self, prefix: impl IntoQueryKey) -> Result<usize, QueryError> {
        let prefix = prefix.into_query_key()?;
        let mut state = self.shared.lock("invalidate")?;

        let mut matched = 0_usize;
        let mut refetched = 0_usize;
        for entry in state.entries.values_mut() {
            if !prefix.is_prefix_of(&entry.key) {
                continue;
            }
            matched += 1;
            entry.stale = true;

            // The running fetch may predate the write; refetch once it lands.
            if entry.in_flight.is_some() {
                entry.reinvalidated = true;
                entry.notify();
                continue;
            }

            if entry.has_enabled_subscribers() && self.shared.start_fetch(entry, "invalidate") {
                refetched += 1;
            } else {
                entry.notify();
            }
        }
        drop(state);

        counter!(METRIC_INVALIDATED_TOTAL, "family" => prefix.family().to_string())
            .increment(matched as u64);
        debug!(
            prefix = %prefix,
            matched,
            refetched,
            "Invalidated queries"
        );
        Ok(matched)
    }

    /// Force a fetch for every observed entry matching `prefix`.
    ///
    /// A fetch already in flight is superseded and its result discarded.
    pub fn refetch(&self, prefix: impl IntoQueryKey) -> Result<usize, QueryError> {
        let prefix = prefix.into_query_key()?;
        let mut state = self.shared.lock("refetch")?;

        let mut started = 0_usize;
        for entry in state.entries.values_mut() {
            if prefix.is_prefix_of(&entry.key)
                && entry.has_enabled_subscribers()
                && self.shared.start_fetch(entry, "refetch")
            {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Store `value` as the entry's payload without fetching.
    pub fn set_data<T>(&self, key: impl IntoQueryKey, value: T) -> Result<(), QueryError>
    where
        T: Send + Sync + 'static,
    {
        let key = key.into_query_key()?;
        let mut state = self.shared.lock("set_data")?;

        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| QueryEntry::new(key));
        entry.generation += 1;
        if entry.in_flight.take().is_some() {
            debug!(
                key = %entry.key,
                generation = entry.generation,
                "Direct write superseded in-flight fetch"
            );
        }
        entry.fetch_task = None;
        entry.data = Some(Arc::new(value) as Payload);
        entry.error = None;
        entry.status = QueryStatus::Success;
        entry.stale = false;
        entry.reinvalidated = false;
        entry.updated_at = Some(OffsetDateTime::now_utc());
        entry.notify();

        if entry.subscribers.is_empty() && entry.gc_token.is_none() {
            self.shared.schedule_gc(entry);
        }
        let entries = state.entries.len();
        gauge!(METRIC_ENTRIES).set(entries as f64);
        Ok(())
    }

    /// Current state of `key` without subscribing, if the entry exists.
    pub fn peek<T>(&self, key: &QueryKey) -> Option<QueryState<T>>
    where
        T: Send + Sync + 'static,
    {
        self.shared.read(key).map(|raw| QueryState::from_raw(&raw))
    }

    /// Run a write once and, when it succeeds, invalidate `invalidates` in order.
    ///
    /// A failed write invalidates nothing and its error is returned unchanged.
    pub async fn mutate<T, E, F, Fut>(&self, mutation: F, invalidates: &[QueryKey]) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QueryError> + fmt::Display,
    {
        if self.is_disposed() {
            return Err(QueryError::Disposed.into());
        }

        let started_at = Instant::now();
        let outcome = mutation().await;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(value) => {
                for key in invalidates {
                    // The write already happened; a cache disposed meanwhile has nothing left to refresh.
                    if let Err(err) = self.invalidate(key) {
                        warn!(key = %key, error = %err, "Skipped invalidation after mutation");
                    }
                }
                counter!(METRIC_MUTATION_TOTAL, "outcome" => "ok").increment(1);
                histogram!(METRIC_MUTATION_MS, "outcome" => "ok").record(elapsed_ms);
                info!(
                    invalidated = invalidates.len(),
                    elapsed_ms,
                    "Mutation applied"
                );
                Ok(value)
            }
            Err(err) => {
                counter!(METRIC_MUTATION_TOTAL, "outcome" => "error").increment(1);
                histogram!(METRIC_MUTATION_MS, "outcome" => "error").record(elapsed_ms);
                warn!(error = %err, elapsed_ms, "Mutation failed");
                Err(err)
            }
        }
    }

    /// Drop every entry, timer and pending completion; later calls fail.
    pub fn dispose(&self) {
        let mut state = mutex_lock(&self.shared.state, SOURCE, "dispose");
        if state.disposed {
            return;
        }
        state.disposed = true;

        let entries = state.entries.len();
        for entry in state.entries.values_mut() {
            entry.abort_tasks();
        }
        // Dropping the senders closes every subscriber channel.
        state.entries.clear();
        drop(state);

        gauge!(METRIC_ENTRIES).set(0.0);
        info!(entries, "Query cache disposed");
    }

    pub fn is_disposed(&self) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "is_disposed").disposed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        mutex_lock(&self.shared.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "contains")
            .entries
            .contains_key(key)
    }

    /// Active subscriptions on `key`, enabled or not.
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.shared.state, SOURCE, "subscriber_count")
            .entries
            .get(key)
            .map_or(0, |entry| entry.subscribers.len())
    }
}

impl Shared {
    fn lock(&self, op: &'static str) -> Result<MutexGuard<'_, CacheState>, QueryError> {
        let state = mutex_lock(&self.state, SOURCE, op);
        if state.disposed {
            return Err(QueryError::Disposed);
        }
        Ok(state)
    }

    fn subscribe(
        self: &Arc<Self>,
        key: &QueryKey,
        fetcher: Fetcher,
        enabled: bool,
    ) -> Result<(SubscriberId, mpsc::UnboundedReceiver<RawSnapshot>), QueryError> {
        let mut state = self.lock("subscribe")?;
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| QueryEntry::new(key.clone()));
        entry.cancel_gc();
        if enabled || entry.fetcher.is_none() {
            entry.fetcher = Some(fetcher);
        }
        entry.subscribers.insert(id, Subscriber { enabled, tx });

        if enabled && entry.needs_fetch() {
            self.start_fetch(entry, "subscribe");
        } else if entry.data.is_some() {
            counter!(METRIC_HIT_TOTAL, "family" => key.family().to_string()).increment(1);
        }

        debug!(
            key = %key,
            subscriber = id,
            enabled,
            subscribers = entry.subscribers.len(),
            status = entry.status.as_str(),
            "Query subscribed"
        );

        let entries = state.entries.len();
        gauge!(METRIC_ENTRIES).set(entries as f64);
        Ok((id, rx))
    }

    pub(crate) fn unsubscribe(self: &Arc<Self>, key: &QueryKey, id: SubscriberId) {
        let Ok(mut state) = self.lock("unsubscribe") else {
            return;
        };
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        if entry.subscribers.remove(&id).is_none() {
            return;
        }

        debug!(
            key = %key,
            subscriber = id,
            subscribers = entry.subscribers.len(),
            "Query unsubscribed"
        );
        if entry.subscribers.is_empty() {
            self.schedule_gc(entry);
        }
    }

    pub(crate) fn set_enabled(
        self: &Arc<Self>,
        key: &QueryKey,
        id: SubscriberId,
        enabled: bool,
    ) -> Result<(), QueryError> {
        let mut state = self.lock("set_enabled")?;
        let Some(entry) = state.entries.get_mut(key) else {
            return Ok(());
        };
        let Some(subscriber) = entry.subscribers.get_mut(&id) else {
            return Ok(());
        };

        let was_enabled = subscriber.enabled;
        subscriber.enabled = enabled;
        if enabled && !was_enabled && entry.needs_fetch() {
            self.start_fetch(entry, "enable");
        }
        Ok(())
    }

    pub(crate) fn read(&self, key: &QueryKey) -> Option<RawSnapshot> {
        let state = self.lock("read").ok()?;
        state.entries.get(key).map(QueryEntry::snapshot)
    }

    /// Begin a fetch under a fresh generation. Caller holds the table lock.
    fn start_fetch(self: &Arc<Self>, entry: &mut QueryEntry, reason: &'static str) -> bool {
        let Some(fetcher) = entry.fetcher.clone() else {
            debug!(key = %entry.key, reason, "No fetch function registered; skipping fetch");
            return false;
        };

        entry.generation += 1;
        let generation = entry.generation;
        entry.in_flight = Some(generation);
        entry.reinvalidated = false;
        entry.status = QueryStatus::Loading;
        entry.notify();

        counter!(
            METRIC_FETCH_TOTAL,
            "family" => entry.key.family().to_string(),
            "reason" => reason
        )
        .increment(1);
        debug!(
            key = %entry.key,
            generation,
            reason,
            subscribers = entry.subscribers.len(),
            "Query fetch started"
        );

        let shared = Arc::downgrade(self);
        let key = entry.key.clone();
        let started_at = Instant::now();
        let task = self.runtime.spawn(async move {
            let result = fetcher().await;
            if let Some(shared) = shared.upgrade() {
                shared.complete_fetch(&key, generation, result, started_at);
            }
        });
        entry.fetch_task = Some(task.abort_handle());
        true
    }

    fn complete_fetch(
        self: &Arc<Self>,
        key: &QueryKey,
        generation: u64,
        result: Result<Payload, FetchError>,
        started_at: Instant,
    ) {
        let Ok(mut state) = self.lock("complete_fetch") else {
            return;
        };
        let Some(entry) = state.entries.get_mut(key) else {
            counter!(METRIC_FETCH_DISCARDED_TOTAL, "family" => key.family().to_string())
                .increment(1);
            return;
        };
        if entry.in_flight != Some(generation) {
            counter!(METRIC_FETCH_DISCARDED_TOTAL, "family" => key.family().to_string())
                .increment(1);
            debug!(
                key = %key,
                generation,
                current = entry.generation,
                "Discarded superseded fetch result"
            );
            return;
        }

        histogram!(METRIC_FETCH_MS, "family" => key.family().to_string())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        entry.in_flight = None;
        entry.fetch_task = None;
        entry.updated_at = Some(OffsetDateTime::now_utc());
        match result {
            Ok(data) => {
                entry.data = Some(data);
                entry.error = None;
                entry.status = QueryStatus::Success;
                entry.stale = entry.reinvalidated;
            }
            Err(err) => {
                counter!(METRIC_FETCH_FAILED_TOTAL, "family" => key.family().to_string())
                    .increment(1);
                warn!(key = %key, generation, error = %err, "Query fetch failed");
                entry.error = Some(err);
                entry.status = QueryStatus::Error;
            }
        }
        let follow_up = entry.reinvalidated && entry.has_enabled_subscribers();
        entry.reinvalidated = false;

        debug!(
            key = %key,
            generation,
            status = entry.status.as_str(),
            stale = entry.stale,
            follow_up,
            "Query fetch settled"
        );

        // A write landed while this fetch ran; observers must see it.
        if follow_up && self.start_fetch(entry, "invalidate") {
            return;
        }
        entry.notify();

        // Eviction was deferred while this fetch was running.
        if entry.subscribers.is_empty() {
            self.schedule_gc(entry);
        }
    }

    /// (Re)arm the idle timer of an unobserved entry. Caller holds the table lock.
    fn schedule_gc(self: &Arc<Self>, entry: &mut QueryEntry) {
        entry.cancel_gc();
        let token = self.next_gc_token.fetch_add(1, Ordering::Relaxed);
        entry.gc_token = Some(token);

        let shared = Arc::downgrade(self);
        let key = entry.key.clone();
        let idle = self.config.gc_idle();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            if let Some(shared) = shared.upgrade() {
                shared.evict_if_idle(&key, token);
            }
        });
        entry.gc_task = Some(task.abort_handle());
    }

    fn evict_if_idle(&self, key: &QueryKey, token: u64) {
        let Ok(mut state) = self.lock("evict") else {
            return;
        };
        let idle = state.entries.get(key).is_some_and(|entry| {
            entry.gc_token == Some(token)
                && entry.subscribers.is_empty()
                && entry.in_flight.is_none()
        });
        if !idle {
            return;
        }

        state.entries.remove(key);
        let entries = state.entries.len();
        drop(state);

        counter!(METRIC_EVICT_TOTAL, "family" => key.family().to_string()).increment(1);
        gauge!(METRIC_ENTRIES).set(entries as f64);
        debug!(key = %key, entries, "Evicted idle query");
    }
}
