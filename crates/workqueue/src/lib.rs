//! # Work Queue
//!
//! Deduplicating, rate-limited FIFO of opaque work items for relevel
//! controllers.
//!
//! - [`WorkQueue`]: set-like FIFO with processing/dirty tracking and delayed adds
//! - [`RateLimitingQueue`]: a work queue plus a [`RateLimiter`] for failed items
//! - [`rate_limiter`]: exponential, token bucket and max-of policies

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod queue;
pub mod rate_limiter;
mod rate_limiting;

pub use queue::{QueueItem, WorkQueue};
pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    RateLimiterConfig, default_controller_rate_limiter,
};
pub use rate_limiting::RateLimitingQueue;

// Include test modules
#[cfg(test)]
mod queue_test;
