//! Work queue with rate-limited re-adds.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::queue::{QueueItem, WorkQueue};
use crate::rate_limiter::{RateLimiter, default_controller_rate_limiter};

/// A [`WorkQueue`] paired with a [`RateLimiter`] for failed items.
///
/// Cloning yields another handle to the same queue and limiter.
pub struct RateLimitingQueue<T> {
    queue: WorkQueue<T>,
    limiter: Arc<dyn RateLimiter<T>>,
}

impl<T> Clone for RateLimitingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<T: QueueItem> fmt::Debug for RateLimitingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitingQueue")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl<T: QueueItem> RateLimitingQueue<T> {
    /// Create a named queue using `limiter` for [`RateLimitingQueue::add_rate_limited`].
    pub fn new(name: impl Into<String>, limiter: Arc<dyn RateLimiter<T>>) -> Self {
        Self {
            queue: WorkQueue::new(name),
            limiter,
        }
    }

    /// Create a named queue with [`default_controller_rate_limiter`].
    pub fn with_default_limiter(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(default_controller_rate_limiter::<T>()))
    }

    /// Queue name, used in logs.
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// See [`WorkQueue::add`].
    pub fn add(&self, item: T) {
        self.queue.add(item);
    }

    /// See [`WorkQueue::add_after`].
    pub fn add_after(&self, item: T, delay: Duration) {
        self.queue.add_after(item, delay);
    }

    /// Add `item` after the delay the rate limiter assigns to it.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.limiter.when(&item);
        debug!(
            queue = %self.queue.name(),
            item = ?item,
            delay_ms = delay.as_millis(),
            requeues = self.limiter.num_requeues(&item),
            "Rate limited re-add"
        );
        self.queue.add_after(item, delay);
    }

    /// Clear the retry history of `item`. The item stays queued if it is.
    pub fn forget(&self, item: &T) {
        self.limiter.forget(item);
    }

    /// How many times `item` was rate limited since it was last forgotten.
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.limiter.num_requeues(item)
    }

    /// See [`WorkQueue::get`].
    pub async fn get(&self) -> Option<T> {
        self.queue.get().await
    }

    /// See [`WorkQueue::done`].
    pub fn done(&self, item: &T) {
        self.queue.done(item);
    }

    /// See [`WorkQueue::shut_down`].
    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    /// See [`WorkQueue::is_shutting_down`].
    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }

    /// See [`WorkQueue::len`].
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// See [`WorkQueue::is_empty`].
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// See [`WorkQueue::processing_len`].
    pub fn processing_len(&self) -> usize {
        self.queue.processing_len()
    }
}
