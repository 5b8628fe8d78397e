//! In-memory query cache.
//!
//! [`QueryClient`] stores query results by [`QueryKey`], serves them while
//! fresh, de-duplicates concurrent fetches and evicts idle entries.
//! [`QueryObserver`] is a live, subscribable view of one key.
//!
//! Defaults: data is fresh for 5 minutes, unobserved entries are evicted
//! after 10 minutes, reads retry transient failures once and mutations never.

pub mod client;
pub mod entry;
pub mod key;
pub mod observer;

pub use client::{
    CacheEvent, EntrySummary, MutationOptions, QueryClient, QueryOptions, DEFAULT_GC_TIME,
    DEFAULT_RETRY_DELAY, DEFAULT_STALE_TIME,
};
pub use entry::age_display;
pub use key::QueryKey;
pub use observer::{QueryObserver, QueryState, QueryStatus};
