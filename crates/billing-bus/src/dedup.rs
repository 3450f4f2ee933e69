//! # Duplicate Envelope Cache
//!
//! Delivery is at-least-once, so a function may see the same envelope more
//! than once. Consumers wrap their invoker in `IdempotentInvoker` to drop
//! repeats of an envelope's logical id within a time window.
//!
//! Entries are garbage-collected once they fall out of the window, which
//! bounds memory.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use billing_types::EventEnvelope;
use parking_lot::Mutex;
use tracing::debug;

use crate::router::{FunctionInvoker, InvocationError};

/// Time-bounded set of recently seen keys.
pub struct DuplicateCache {
    /// Key -> instant first seen.
    seen: HashMap<String, Instant>,
    /// How long a key suppresses repeats.
    window: Duration,
    /// Last garbage collection.
    last_gc: Instant,
    /// Garbage collection interval.
    gc_interval: Duration,
}

impl DuplicateCache {
    /// Default suppression window: 15 minutes.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    /// Create a cache with a custom window.
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
            last_gc: Instant::now(),
            gc_interval: Self::DEFAULT_GC_INTERVAL.min(window),
        }
    }

    /// Record `key`. Returns `false` if it was already seen within the window.
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        self.check_and_insert_at(key, Instant::now())
    }

    /// Same as `check_and_insert` with an explicit clock.
    pub fn check_and_insert_at(&mut self, key: &str, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_gc) >= self.gc_interval {
            self.garbage_collect(now);
            self.last_gc = now;
        }

        if let Some(first_seen) = self.seen.get(key) {
            if now.saturating_duration_since(*first_seen) < self.window {
                return false;
            }
        }
        self.seen.insert(key.to_string(), now);
        true
    }

    /// Drop a key so the next delivery is processed again.
    pub fn forget(&mut self, key: &str) {
        self.seen.remove(key);
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn garbage_collect(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);
    }
}

impl Default for DuplicateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoker decorator that suppresses duplicate deliveries per function.
pub struct IdempotentInvoker<I: FunctionInvoker> {
    inner: I,
    cache: Mutex<DuplicateCache>,
}

impl<I: FunctionInvoker> IdempotentInvoker<I> {
    /// Wrap an invoker with the default window.
    pub fn new(inner: I) -> Self {
        Self::with_cache(inner, DuplicateCache::new())
    }

    /// Wrap an invoker with a prepared cache.
    pub fn with_cache(inner: I, cache: DuplicateCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    /// Borrow the wrapped invoker.
    pub fn inner(&self) -> &I {
        &self.inner
    }
}

#[async_trait]
impl<I: FunctionInvoker> FunctionInvoker for IdempotentInvoker<I> {
    async fn invoke(
        &self,
        function_name: &str,
        envelope: &EventEnvelope,
    ) -> Result<Vec<EventEnvelope>, InvocationError> {
        let key = format!("{}:{}", function_name, envelope.logical_id());
        let fresh = self.cache.lock().check_and_insert(&key);
        if !fresh {
            debug!(function = function_name, "Duplicate envelope suppressed");
            return Ok(Vec::new());
        }

        let result = self.inner.invoke(function_name, envelope).await;
        if result.is_err() {
            // A failed attempt must not suppress the redelivery.
            self.cache.lock().forget(&key);
        }
        result
    }
}
