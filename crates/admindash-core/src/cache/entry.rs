use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::api::ApiError;

/// Cached values are stored type-erased; typed accessors downcast on read.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// A fetch in progress, awaitable by any number of callers.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, ApiError>>>;

/// One slot of the query cache.
pub(crate) struct CacheEntry {
    pub value: Option<AnyValue>,
    pub updated_at: Option<Instant>,
    pub error: Option<ApiError>,
    /// Only a fetch started under this generation may commit.
    pub generation: u64,
    pub in_flight: Option<SharedFetch>,
    pub invalidated: bool,
    pub observers: usize,
    pub last_accessed: Instant,
    pub gc_time: Duration,
}

impl CacheEntry {
    pub fn new(generation: u64, gc_time: Duration, now: Instant) -> Self {
        Self {
            value: None,
            updated_at: None,
            error: None,
            generation,
            in_flight: None,
            invalidated: false,
            observers: 0,
            last_accessed: now,
            gc_time,
        }
    }

    pub fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
        if self.invalidated || self.value.is_none() {
            return false;
        }
        match self.updated_at {
            Some(at) => now.saturating_duration_since(at) < stale_time,
            None => false,
        }
    }

    /// Unobserved, idle, and untouched for longer than its gc time.
    pub fn is_collectable(&self, now: Instant) -> bool {
        self.observers == 0
            && self.in_flight.is_none()
            && now.saturating_duration_since(self.last_accessed) >= self.gc_time
    }

    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.updated_at.map(|at| now.saturating_duration_since(at))
    }
}

/// Human-readable age: "just now", "5m ago", "2h ago", "3d ago".
pub fn age_display(age: Duration) -> String {
    let minutes = age.as_secs() / 60;
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            // 1h 30m+ rounds up to 2h
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
