use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use super::client::{erase, CacheEvent, ErasedFetcher, FetchMode, QueryClient, QueryOptions};
use super::key::QueryKey;
use crate::api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Nothing fetched yet and nothing in flight.
    Idle,
    Loading,
    Success,
    Error,
}

/// What an observer currently sees for its key.
pub struct QueryState<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<ApiError>,
    pub is_fetching: bool,
    /// `data` belongs to the key observed before the last `set_key`.
    pub is_previous_data: bool,
}

impl<T> QueryState<T> {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            is_previous_data: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// A fetch finished and none is running.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, QueryStatus::Success | QueryStatus::Error) && !self.is_fetching
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            is_previous_data: self.is_previous_data,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("status", &self.status)
            .field("data", &self.data)
            .field("error", &self.error)
            .field("is_fetching", &self.is_fetching)
            .field("is_previous_data", &self.is_previous_data)
            .finish()
    }
}

#[derive(Clone)]
struct Target {
    key: QueryKey,
    fetcher: ErasedFetcher,
}

/// Live view of one query.
///
/// A background task keeps the state current: it fetches when the entry is
/// stale, republishes on every cache change for the key, refetches when the
/// entry is invalidated and, with `refetch_interval`, on a timer. Dropping the
/// observer stops that task but never cancels a fetch already started.
///
/// Must be created inside a Tokio runtime.
pub struct QueryObserver<T> {
    client: QueryClient,
    options: QueryOptions,
    target: watch::Sender<Target>,
    state: watch::Receiver<QueryState<T>>,
    driver: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub fn new<F, Fut>(client: &QueryClient, key: QueryKey, options: QueryOptions, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (target, target_rx) = watch::channel(Target {
            key,
            fetcher: erase(fetcher),
        });
        let (state_tx, state) = watch::channel(QueryState::idle());
        // Subscribe before the driver starts so no event is missed
        let events = client.subscribe_events();
        let driver = tokio::spawn(drive(
            client.clone(),
            options.clone(),
            target_rx,
            state_tx,
            events,
        ));

        Self {
            client: client.clone(),
            options,
            target,
            state,
            driver,
        }
    }

    pub fn key(&self) -> QueryKey {
        self.target.borrow().key.clone()
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.clone()
    }

    /// Wait for the next state change. `None` once the observer has stopped.
    pub async fn changed(&mut self) -> Option<QueryState<T>> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until a fetch has finished and none is running.
    pub async fn settled(&mut self) -> Option<QueryState<T>> {
        self.state
            .wait_for(QueryState::is_settled)
            .await
            .ok()
            .map(|state| state.clone())
    }

    /// Switch to another key (new filters, another id).
    pub fn set_key<F, Fut>(&mut self, key: QueryKey, fetcher: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.target.send_replace(Target {
            key,
            fetcher: erase(fetcher),
        });
    }

    /// Fetch now, superseding any fetch in flight for the key.
    pub fn refetch(&self) {
        let target = self.target.borrow().clone();
        self.client
            .begin(&target.key, &self.options, target.fetcher, FetchMode::Supersede);
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Counts as an observer of `key` for garbage collection while alive.
struct Attachment {
    client: QueryClient,
    key: QueryKey,
}

impl Attachment {
    fn new(client: &QueryClient, key: QueryKey, options: &QueryOptions) -> Self {
        client.attach(&key, options.gc_time);
        Self {
            client: client.clone(),
            key,
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.client.detach(&self.key);
    }
}

async fn drive<T: Send + Sync + 'static>(
    client: QueryClient,
    options: QueryOptions,
    mut target: watch::Receiver<Target>,
    state: watch::Sender<QueryState<T>>,
    mut events: broadcast::Receiver<CacheEvent>,
) {
    let mut previous: Option<Arc<T>> = None;
    let mut attachment: Option<Attachment> = None;

    loop {
        let Target { key, fetcher } = target.borrow_and_update().clone();
        // Detach from the old key before attaching to the new one
        attachment.take();
        attachment = Some(Attachment::new(&client, key.clone(), &options));

        client.begin(&key, &options, fetcher.clone(), FetchMode::IfStale);
        publish(&client, &key, &options, &state, &mut previous);

        let mut ticker = options.refetch_interval.map(|period| {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                changed = target.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                event = events.recv() => match event {
                    Ok(CacheEvent::Updated(updated)) if updated == key => {
                        if publish(&client, &key, &options, &state, &mut previous) {
                            debug!(key = %key, "Refetching invalidated query");
                            client.begin(&key, &options, fetcher.clone(), FetchMode::IfStale);
                        }
                    }
                    Ok(CacheEvent::Removed(removed)) if removed == key => {
                        previous = None;
                        attachment.take();
                        attachment = Some(Attachment::new(&client, key.clone(), &options));
                        publish(&client, &key, &options, &state, &mut previous);
                    }
                    Ok(CacheEvent::Cleared) => {
                        previous = None;
                        attachment.take();
                        attachment = Some(Attachment::new(&client, key.clone(), &options));
                        publish(&client, &key, &options, &state, &mut previous);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(key = %key, skipped, "Observer lagged, resyncing");
                        publish(&client, &key, &options, &state, &mut previous);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = tick(&mut ticker) => {
                    debug!(key = %key, "Interval refetch");
                    client.begin(&key, &options, fetcher.clone(), FetchMode::Always);
                }
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Push the entry's current state. Returns true if it was invalidated and
/// nothing is refetching it yet.
fn publish<T: Send + Sync + 'static>(
    client: &QueryClient,
    key: &QueryKey,
    options: &QueryOptions,
    state: &watch::Sender<QueryState<T>>,
    previous: &mut Option<Arc<T>>,
) -> bool {
    let Some(snapshot) = client.snapshot::<T>(key) else {
        state.send_replace(QueryState::idle());
        return false;
    };

    let (data, is_previous_data) = match snapshot.data {
        Some(data) => {
            *previous = Some(data.clone());
            (Some(data), false)
        }
        None if options.keep_previous_data && previous.is_some() => (previous.clone(), true),
        None => (None, false),
    };
    let status = if snapshot.error.is_some() {
        QueryStatus::Error
    } else if data.is_some() {
        QueryStatus::Success
    } else if snapshot.is_fetching {
        QueryStatus::Loading
    } else {
        QueryStatus::Idle
    };

    state.send_replace(QueryState {
        status,
        data,
        error: snapshot.error,
        is_fetching: snapshot.is_fetching,
        is_previous_data,
    });
    snapshot.invalidated && !snapshot.is_fetching
}
