use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::entry::{age_display, AnyValue, CacheEntry, SharedFetch};
use super::key::QueryKey;
use crate::api::ApiError;

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 64;

/// Per-query behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long a committed value is served without refetching.
    pub stale_time: Duration,
    /// How long an unobserved entry survives before eviction.
    pub gc_time: Duration,
    /// Extra attempts after a transient failure.
    pub retry: u32,
    /// Delay before the first retry; grows linearly per attempt.
    pub retry_delay: Duration,
    /// Background refetch period while observed.
    pub refetch_interval: Option<Duration>,
    /// Keep showing the last key's data while a new key loads.
    pub keep_previous_data: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            retry: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
            refetch_interval: None,
            keep_previous_data: false,
        }
    }
}

impl QueryOptions {
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = keep;
        self
    }
}

/// Mutations are not cached and, by default, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOptions {
    pub retry: u32,
    pub retry_delay: Duration,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            retry: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Change notifications for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Value, error or fetching state of the key changed.
    Updated(QueryKey),
    Removed(QueryKey),
    Cleared,
}

/// Point-in-time description of one entry.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub key: QueryKey,
    pub age: Option<Duration>,
    pub is_fetching: bool,
    pub has_error: bool,
    pub observers: usize,
}

impl EntrySummary {
    pub fn age_display(&self) -> String {
        match self.age {
            Some(age) => age_display(age),
            None => "never".to_string(),
        }
    }
}

pub(crate) type ErasedFetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<AnyValue, ApiError>> + Send + Sync>;

pub(crate) fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move { fut.await.map(|value| Arc::new(value) as AnyValue) }.boxed()
    })
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: AnyValue) -> Result<Arc<T>, ApiError> {
    value.downcast::<T>().map_err(|_| {
        ApiError::unexpected(format!("Cached value for {} has an unexpected type", key))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMode {
    /// Serve fresh data, else join or start a fetch.
    IfStale,
    /// Join an in-flight fetch or start one, ignoring freshness.
    Always,
    /// Start a new fetch even if one is in flight.
    Supersede,
}

pub(crate) enum Lookup {
    Ready(AnyValue),
    Pending(SharedFetch),
}

/// Typed view of an entry for observers.
pub(crate) struct EntrySnapshot<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<ApiError>,
    pub is_fetching: bool,
    pub invalidated: bool,
}

struct State {
    entries: HashMap<QueryKey, CacheEntry>,
    last_generation: u64,
}

impl State {
    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }

    fn collect(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let keep = !entry.is_collectable(now);
            if !keep {
                debug!(key = %key, "Evicting idle cache entry");
            }
            keep
        });
        before - self.entries.len()
    }
}

struct Inner {
    state: Mutex<State>,
    events: broadcast::Sender<CacheEvent>,
}

/// Keyed query cache with request de-duplication.
///
/// At most one fetch per key is in flight. Fetches run as spawned tasks, so a
/// result is committed even when every caller waiting on it has gone away.
/// Each fetch is stamped with a generation; anything that overwrites or
/// discards an entry (`refetch`, `set_query_data`, `invalidate`, `remove`,
/// `clear`) moves the entry past that generation and the stale fetch's
/// result is dropped instead of committed.
///
/// Clone is cheap - all clones share one cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    last_generation: 0,
                }),
                events,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    // ===== Queries =====

    /// Return fresh cached data, or join/start the fetch for `key`.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        options: &QueryOptions,
        fetcher: F,
    ) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let lookup = self.begin(&key, options, erase(fetcher), FetchMode::IfStale);
        self.resolve(&key, lookup).await
    }

    /// Fetch regardless of freshness, superseding any fetch in flight.
    pub async fn refetch<T, F, Fut>(
        &self,
        key: QueryKey,
        options: &QueryOptions,
        fetcher: F,
    ) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let lookup = self.begin(&key, options, erase(fetcher), FetchMode::Supersede);
        self.resolve(&key, lookup).await
    }

    /// Start a fetch in the background if the entry is stale. Returns at once.
    pub fn prefetch<T, F, Fut>(&self, key: QueryKey, options: &QueryOptions, fetcher: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.begin(&key, options, erase(fetcher), FetchMode::IfStale);
    }

    async fn resolve<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        lookup: Lookup,
    ) -> Result<Arc<T>, ApiError> {
        let value = match lookup {
            Lookup::Ready(value) => value,
            Lookup::Pending(fetch) => fetch.await?,
        };
        downcast(key, value)
    }

    pub(crate) fn begin(
        &self,
        key: &QueryKey,
        options: &QueryOptions,
        fetcher: ErasedFetcher,
        mode: FetchMode,
    ) -> Lookup {
        let now = Instant::now();
        let mut state = self.lock();
        state.collect(now);

        let State {
            entries,
            last_generation,
        } = &mut *state;
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(0, options.gc_time, now));
        entry.last_accessed = now;
        entry.gc_time = options.gc_time;

        if mode == FetchMode::IfStale && entry.is_fresh(options.stale_time, now) {
            if let Some(value) = &entry.value {
                debug!(key = %key, "Cache hit");
                return Lookup::Ready(value.clone());
            }
        }
        if mode != FetchMode::Supersede {
            if let Some(fetch) = &entry.in_flight {
                debug!(key = %key, "Joining in-flight fetch");
                return Lookup::Pending(fetch.clone());
            }
        }

        *last_generation += 1;
        let generation = *last_generation;
        entry.generation = generation;
        debug!(key = %key, generation, "Starting fetch");

        let task = tokio::spawn(run_fetch(
            self.clone(),
            key.clone(),
            generation,
            fetcher,
            options.retry,
            options.retry_delay,
        ));
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ApiError::unexpected(format!("Fetch task failed: {}", e))),
            }
        }
        .boxed()
        .shared();
        entry.in_flight = Some(fetch.clone());
        drop(state);

        self.emit(CacheEvent::Updated(key.clone()));
        Lookup::Pending(fetch)
    }

    fn commit(&self, key: &QueryKey, generation: u64, result: &Result<AnyValue, ApiError>) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            debug!(key = %key, generation, "Entry gone, discarding fetch result");
            return;
        };
        if entry.generation != generation {
            debug!(
                key = %key,
                generation,
                current = entry.generation,
                "Superseded fetch result discarded"
            );
            return;
        }

        entry.in_flight = None;
        entry.invalidated = false;
        match result {
            Ok(value) => {
                entry.value = Some(value.clone());
                entry.updated_at = Some(Instant::now());
                entry.error = None;
            }
            Err(e) => {
                entry.error = Some(e.clone());
            }
        }
        drop(state);

        self.emit(CacheEvent::Updated(key.clone()));
    }

    // ===== Direct cache access =====

    /// Cached value regardless of freshness.
    pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        let value = entry.value.clone()?;
        drop(state);
        match downcast(key, value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring cached value");
                None
            }
        }
    }

    /// Write a value directly. Supersedes any fetch in flight for the key.
    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        let now = Instant::now();
        let mut state = self.lock();
        let generation = state.next_generation();
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(generation, DEFAULT_GC_TIME, now));
        entry.generation = generation;
        entry.value = Some(Arc::new(value));
        entry.updated_at = Some(now);
        entry.error = None;
        entry.in_flight = None;
        entry.invalidated = false;
        entry.last_accessed = now;
        drop(state);

        debug!(key = %key, "Cache data set");
        self.emit(CacheEvent::Updated(key));
    }

    /// Mark stale and supersede any fetch in flight. Returns false if absent.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = self.lock();
        let generation = state.next_generation();
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        entry.generation = generation;
        entry.invalidated = true;
        entry.in_flight = None;
        drop(state);

        debug!(key = %key, "Cache entry invalidated");
        self.emit(CacheEvent::Updated(key.clone()));
        true
    }

    /// Invalidate every key whose operation matches `prefix`.
    pub fn invalidate_operation(&self, prefix: &str) -> usize {
        let mut state = self.lock();
        let generation = state.next_generation();
        let mut touched = Vec::new();
        for (key, entry) in state.entries.iter_mut() {
            if key.matches_prefix(prefix) {
                entry.generation = generation;
                entry.invalidated = true;
                entry.in_flight = None;
                touched.push(key.clone());
            }
        }
        drop(state);

        debug!(prefix, count = touched.len(), "Cache entries invalidated");
        let count = touched.len();
        for key in touched {
            self.emit(CacheEvent::Updated(key));
        }
        count
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.lock().entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "Cache entry removed");
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Drop every entry. Fetches still in flight will not commit.
    pub fn clear(&self) {
        let count = {
            let mut state = self.lock();
            let count = state.entries.len();
            state.entries.clear();
            count
        };
        debug!(count, "Cache cleared");
        self.emit(CacheEvent::Cleared);
    }

    /// Evict unobserved entries idle for longer than their gc time.
    pub fn collect_garbage(&self) -> usize {
        self.lock().collect(Instant::now())
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> Vec<EntrySummary> {
        let now = Instant::now();
        let mut summary: Vec<EntrySummary> = self
            .lock()
            .entries
            .iter()
            .map(|(key, entry)| EntrySummary {
                key: key.clone(),
                age: entry.age(now),
                is_fetching: entry.in_flight.is_some(),
                has_error: entry.error.is_some(),
                observers: entry.observers,
            })
            .collect();
        summary.sort_by(|a, b| a.key.cmp(&b.key));
        summary
    }

    // ===== Observer bookkeeping =====

    pub(crate) fn attach(&self, key: &QueryKey, gc_time: Duration) {
        let now = Instant::now();
        let mut state = self.lock();
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(0, gc_time, now));
        entry.observers += 1;
        entry.last_accessed = now;
    }

    pub(crate) fn detach(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.last_accessed = Instant::now();
        }
    }

    pub(crate) fn snapshot<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<EntrySnapshot<T>> {
        let state = self.lock();
        let entry = state.entries.get(key)?;
        let data = entry
            .value
            .clone()
            .and_then(|value| value.downcast::<T>().ok());
        Some(EntrySnapshot {
            data,
            error: entry.error.clone(),
            is_fetching: entry.in_flight.is_some(),
            invalidated: entry.invalidated,
        })
    }

    // ===== Mutations =====

    /// Run a mutation, retrying transient failures `options.retry` times.
    pub async fn mutate<T, F, Fut>(&self, options: &MutationOptions, mutation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        with_retry("mutation", options.retry, options.retry_delay, mutation).await
    }
}

async fn run_fetch(
    client: QueryClient,
    key: QueryKey,
    generation: u64,
    fetcher: ErasedFetcher,
    retry: u32,
    retry_delay: Duration,
) -> Result<AnyValue, ApiError> {
    let label = key.to_string();
    let result = with_retry(&label, retry, retry_delay, || fetcher()).await;
    client.commit(&key, generation, &result);
    result
}

/// Only transient errors (network, unexpected) are retried.
async fn with_retry<T, F, Fut>(
    label: &str,
    retry: u32,
    retry_delay: Duration,
    mut attempt_fn: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retry && e.is_transient() => {
                attempt += 1;
                warn!(query = label, attempt, error = %e, "Request failed, retrying");
                if !retry_delay.is_zero() {
                    tokio::time::sleep(retry_delay * attempt).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    /// Fetcher returning the call number (1-based) after `delay`.
    fn counting(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<usize, ApiError>> + Send + Sync + 'static {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(delay).await;
                Ok(n)
            }
            .boxed()
        }
    }

    fn no_retry() -> QueryOptions {
        QueryOptions::default().retry(0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_share_one_request() {
        let client = QueryClient::new();
        let calls = counter();
        let key = QueryKey::new("dashboard.stats");
        let options = QueryOptions::default();

        let (a, b) = tokio::join!(
            client.fetch_query(key.clone(), &options, counting(&calls, Duration::from_millis(50))),
            client.fetch_query(key.clone(), &options, counting(&calls, Duration::from_millis(50))),
        );
        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!client.is_fetching(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_data_served_until_stale() {
        let client = QueryClient::new();
        let calls = counter();
        let key = QueryKey::new("dashboard.stats");
        let options = QueryOptions::default();

        let first = client
            .fetch_query(key.clone(), &options, counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let second = client
            .fetch_query(key.clone(), &options, counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!((*first, *second), (1, 1));

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let third = client
            .fetch_query(key.clone(), &options, counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(*third, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_supersedes_in_flight_fetch() {
        let client = QueryClient::new();
        let key = QueryKey::new("users.list");
        let options = no_retry();

        let slow = counter();
        client.prefetch(key.clone(), &options, counting(&slow, Duration::from_millis(100)));
        assert!(client.is_fetching(&key));

        let fast = Arc::new(AtomicUsize::new(41));
        let value = client
            .refetch(key.clone(), &options, counting(&fast, Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(*value, 42);

        // Let the slow fetch finish; its result must not overwrite the newer one
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(slow.load(Ordering::SeqCst), 1);
        assert_eq!(*client.get_query_data::<usize>(&key).unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_committed_after_waiter_dropped() {
        let client = QueryClient::new();
        let calls = counter();
        let key = QueryKey::new("dashboard.activity");

        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            client.fetch_query(key.clone(), &no_retry(), counting(&calls, Duration::from_millis(50))),
        )
        .await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*client.get_query_data::<usize>(&key).unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_in_flight_results() {
        let client = QueryClient::new();
        let calls = counter();
        let key = QueryKey::new("auth.currentUser");

        client.prefetch(key.clone(), &no_retry(), counting(&calls, Duration::from_millis(50)));
        client.clear();
        assert!(client.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.get_query_data::<usize>(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_query_data_supersedes_in_flight_fetch() {
        let client = QueryClient::new();
        let calls = counter();
        let key = QueryKey::new("auth.currentUser");

        client.prefetch(key.clone(), &no_retry(), counting(&calls, Duration::from_millis(50)));
        client.set_query_data(key.clone(), 7usize);
        assert!(!client.is_fetching(&key));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*client.get_query_data::<usize>(&key).unwrap(), 7);

        // And it counts as fresh
        let value = client
            .fetch_query(key.clone(), &no_retry(), counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(*value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let client = QueryClient::new();
        let calls = counter();
        let detail = QueryKey::with_params("users.detail", "user_1");
        let list = QueryKey::with_params("users.list", &crate::models::UserFilters::default());
        let stats = QueryKey::new("dashboard.stats");

        for key in [&detail, &list, &stats] {
            client
                .fetch_query(key.clone(), &no_retry(), counting(&calls, Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(client.invalidate_operation("users"), 2);
        assert!(!client.invalidate(&QueryKey::new("missing")));

        client
            .fetch_query(detail.clone(), &no_retry(), counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        client
            .fetch_query(stats.clone(), &no_retry(), counting(&calls, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_previous_value() {
        let client = QueryClient::new();
        let key = QueryKey::new("dashboard.stats");

        client
            .fetch_query(key.clone(), &no_retry(), || async { Ok::<_, ApiError>(1u32) })
            .await
            .unwrap();
        let err = client
            .refetch(key.clone(), &no_retry(), || async {
                Err::<u32, _>(ApiError::not_found("gone"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(*client.get_query_data::<u32>(&key).unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_once() {
        let client = QueryClient::new();
        let calls = counter();
        let key = QueryKey::new("dashboard.stats");
        let fetch_calls = calls.clone();
        let fetcher = move || {
            let n = fetch_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::network("connection reset"))
                } else {
                    Ok(n)
                }
            }
        };

        let value = client
            .fetch_query(key, &QueryOptions::default(), fetcher)
            .await
            .unwrap();
        assert_eq!(*value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_bounded_and_skips_client_errors() {
        let client = QueryClient::new();

        let calls = counter();
        let fetch_calls = calls.clone();
        let err = client
            .fetch_query(QueryKey::new("a"), &QueryOptions::default(), move || {
                fetch_calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::network("down")) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = counter();
        let fetch_calls = calls.clone();
        client
            .fetch_query(QueryKey::new("b"), &QueryOptions::default(), move || {
                fetch_calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::validation("bad filter")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_not_retried_by_default() {
        let client = QueryClient::new();
        let calls = counter();
        let err = client
            .mutate(&MutationOptions::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ApiError::network("down")) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_collection_skips_observed_entries() {
        let client = QueryClient::new();
        let watched = QueryKey::new("watched");
        let idle = QueryKey::new("idle");
        client.set_query_data(watched.clone(), 1u8);
        client.set_query_data(idle.clone(), 2u8);
        client.attach(&watched, DEFAULT_GC_TIME);

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert_eq!(client.collect_garbage(), 0);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(client.collect_garbage(), 1);
        assert!(client.get_query_data::<u8>(&watched).is_some());
        assert!(client.get_query_data::<u8>(&idle).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_is_an_error() {
        let client = QueryClient::new();
        let key = QueryKey::new("stats");
        client.set_query_data(key.clone(), "text".to_string());

        assert!(client.get_query_data::<u64>(&key).is_none());
        let err = client
            .fetch_query(key, &no_retry(), || async { Ok::<u64, ApiError>(1) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let client = QueryClient::new();
        let mut events = client.subscribe_events();
        let key = QueryKey::new("k");

        client.set_query_data(key.clone(), 1u8);
        client.remove(&key);
        client.clear();

        assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(key.clone()));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Removed(key));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Cleared);
    }

    #[test]
    fn test_summary_age_display() {
        let summary = EntrySummary {
            key: QueryKey::new("k"),
            age: None,
            is_fetching: false,
            has_error: false,
            observers: 0,
        };
        assert_eq!(summary.age_display(), "never");
    }
}
