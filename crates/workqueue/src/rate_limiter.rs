//! Rate limiting policies for re-queued items.
//!
//! A [`RateLimiter`] answers "how long should this item wait before it is
//! eligible again" and keeps whatever per-item history it needs to answer
//! that. The controller default combines two policies with
//! [`MaxOfRateLimiter`]:
//!
//! - per-item exponential backoff (`base * 2^failures`, capped)
//! - a token bucket shared by every item, bounding the overall retry rate

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use relevel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::queue::QueueItem;

/// Policy deciding when a failed item becomes eligible again.
pub trait RateLimiter<T>: Send + Sync {
    /// Delay before `item` may be processed again. Records one more failure.
    fn when(&self, item: &T) -> Duration;

    /// Drop all history for `item`.
    fn forget(&self, item: &T);

    /// How many times `item` has been rate limited since it was last forgotten.
    fn num_requeues(&self, item: &T) -> u32;
}

/// `base * 2^attempt`, saturating at `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |backoff| backoff.min(max))
}

/// Per-item exponential backoff.
pub struct ItemExponentialFailureRateLimiter<T> {
    base_delay: Duration,
    max_delay: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T: QueueItem> ItemExponentialFailureRateLimiter<T> {
    /// Create a limiter starting at `base_delay` and capped at `max_delay`.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: QueueItem> RateLimiter<T> for ItemExponentialFailureRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(item.clone()).or_insert(0);
        let attempt = *count;
        *count = count.saturating_add(1);
        calculate_backoff(attempt, self.base_delay, self.max_delay)
    }

    fn forget(&self, item: &T) {
        self.failures.lock().remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Token bucket shared by all items.
///
/// Every call to [`RateLimiter::when`] reserves one token, possibly in the
/// future, and returns how long until that token is available. Keeps no
/// per-item history.
pub struct BucketRateLimiter {
    qps: f64,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    /// Create a bucket refilling at `qps` tokens per second holding at most
    /// `burst` tokens. It starts full.
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last: Instant::now(),
            }),
        }
    }

    fn reserve(&self) -> Duration {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Duration::ZERO;
        }

        let now = Instant::now();
        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.qps, bucket.tokens).min(f64::from(self.burst));
        bucket.last = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(&self, _item: &T) -> Duration {
        self.reserve()
    }

    fn forget(&self, _item: &T) {}

    fn num_requeues(&self, _item: &T) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay any of them asks for.
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Box<dyn RateLimiter<T>>>,
}

impl<T> MaxOfRateLimiter<T> {
    /// Combine the given limiters.
    pub fn new(limiters: Vec<Box<dyn RateLimiter<T>>>) -> Self {
        Self { limiters }
    }
}

impl<T> RateLimiter<T> for MaxOfRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        // every limiter must see the failure, so no short-circuiting
        self.limiters
            .iter()
            .map(|limiter| limiter.when(item))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, item: &T) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Delay after the first failure, in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling for the per-item backoff, in milliseconds.
    pub max_delay_ms: u64,
    /// Overall retry rate across all items, per second.
    pub qps: f64,
    /// Retries allowed above `qps` in a burst.
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_ms: 1_000_000,
            qps: 10.0,
            burst: 100,
        }
    }
}

impl RateLimiterConfig {
    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero base delay, a ceiling below
    /// the base delay, a non-positive rate or a zero burst.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::invalid_config("rate_limiter.base_delay_ms must be positive"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::invalid_config(format!(
                "rate_limiter.max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Err(Error::invalid_config("rate_limiter.qps must be a positive number"));
        }
        if self.burst == 0 {
            return Err(Error::invalid_config("rate_limiter.burst must be positive"));
        }
        Ok(())
    }

    /// Build the exponential-plus-bucket limiter these settings describe.
    pub fn build<T: QueueItem>(&self) -> MaxOfRateLimiter<T> {
        MaxOfRateLimiter::new(vec![
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )),
            Box::new(BucketRateLimiter::new(self.qps, self.burst)),
        ])
    }
}

/// Exponential backoff from 5ms to 1000s, limited overall to 10 qps with a
/// burst of 100.
pub fn default_controller_rate_limiter<T: QueueItem>() -> MaxOfRateLimiter<T> {
    RateLimiterConfig::default().build()
}
