//! Tests for queue management.
//!
//! Validates deduplication, processing/dirty semantics, delayed adds and
//! shutdown behaviour.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::arithmetic_side_effects)]

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;

use crate::queue::WorkQueue;
use crate::rate_limiter::ItemExponentialFailureRateLimiter;
use crate::rate_limiting::RateLimitingQueue;

/// Item whose identity is `id` only; `version` is payload.
#[derive(Debug, Clone)]
struct Versioned {
    id: &'static str,
    version: u32,
}

impl PartialEq for Versioned {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Versioned {}

impl Hash for Versioned {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

async fn get_now<T: crate::QueueItem>(queue: &WorkQueue<T>) -> Option<T> {
    timeout(Duration::from_millis(100), queue.get())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_queue_operations() {
    let queue: WorkQueue<&str> = WorkQueue::new("test");
    assert_eq!(queue.len(), 0);
    assert!(queue.is_empty());
    assert_eq!(queue.name(), "test");
}

#[tokio::test]
async fn test_fifo_order() {
    let queue = WorkQueue::new("test");
    queue.add("a");
    queue.add("b");
    queue.add("c");

    assert_eq!(get_now(&queue).await, Some("a"));
    assert_eq!(get_now(&queue).await, Some("b"));
    assert_eq!(get_now(&queue).await, Some("c"));
}

#[tokio::test]
async fn test_pending_duplicates_coalesce() {
    let queue = WorkQueue::new("test");
    queue.add("a");
    queue.add("b");
    queue.add("a");
    queue.add("a");

    assert_eq!(queue.len(), 2);
    assert_eq!(get_now(&queue).await, Some("a"));
    assert_eq!(get_now(&queue).await, Some("b"));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_latest_payload_wins_while_pending() {
    let queue = WorkQueue::new("test");
    queue.add(Versioned { id: "a", version: 1 });
    queue.add(Versioned { id: "a", version: 2 });
    queue.add(Versioned { id: "a", version: 3 });

    let item = get_now(&queue).await.unwrap();
    assert_eq!(item.version, 3);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_add_while_processing_is_deferred_until_done() {
    let queue = WorkQueue::new("test");
    queue.add("a");
    let item = get_now(&queue).await.unwrap();

    queue.add("a");
    queue.add("a");
    assert!(queue.is_empty(), "processing item must not be handed out twice");

    queue.done(&item);
    assert_eq!(queue.len(), 1);
    assert_eq!(get_now(&queue).await, Some("a"));
    queue.done(&"a");
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_done_without_readd_does_not_requeue() {
    let queue = WorkQueue::new("test");
    queue.add("a");
    let item = get_now(&queue).await.unwrap();
    queue.done(&item);

    assert!(queue.is_empty());
    assert_eq!(queue.processing_len(), 0);
}

#[tokio::test]
async fn test_processing_payload_refreshed_on_requeue() {
    let queue = WorkQueue::new("test");
    queue.add(Versioned { id: "a", version: 1 });
    let first = get_now(&queue).await.unwrap();

    queue.add(Versioned { id: "a", version: 2 });
    queue.add(Versioned { id: "a", version: 3 });
    queue.done(&first);

    let second = get_now(&queue).await.unwrap();
    assert_eq!(second.version, 3);
}

#[tokio::test]
async fn test_shutdown_wakes_waiting_get() {
    let queue: WorkQueue<&str> = WorkQueue::new("test");
    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.get().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.shut_down();

    let result = timeout(Duration::from_secs(1), waiter).await;
    assert!(matches!(result, Ok(Ok(None))));
    assert!(queue.is_shutting_down());
}

#[tokio::test]
async fn test_add_after_shutdown_is_ignored() {
    let queue = WorkQueue::new("test");
    queue.shut_down();
    queue.add("a");

    assert!(queue.is_empty());
    assert_eq!(queue.get().await, None);
}

#[tokio::test]
async fn test_get_wakes_on_add() {
    let queue = WorkQueue::new("test");
    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.get().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.add("late");

    let result = timeout(Duration::from_secs(1), waiter).await;
    assert!(matches!(result, Ok(Ok(Some("late")))));
}

#[tokio::test(start_paused = true)]
async fn test_add_after_waits_for_delay() {
    let queue = WorkQueue::new("test");
    queue.add_after("a", Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(queue.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_after_zero_delay_adds_immediately() {
    let queue = WorkQueue::new("test");
    queue.add_after("a", Duration::ZERO);
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_add_dropped_on_shutdown() {
    let queue = WorkQueue::new("test");
    queue.add_after("a", Duration::from_secs(1));
    queue.shut_down();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_requeue_tracks_history() {
    let queue = RateLimitingQueue::new(
        "test",
        Arc::new(ItemExponentialFailureRateLimiter::<&str>::new(
            Duration::from_millis(10),
            Duration::from_secs(1),
        )),
    );

    queue.add_rate_limited("a");
    queue.add_rate_limited("a");
    assert_eq!(queue.num_requeues(&"a"), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.len(), 1);

    queue.forget(&"a");
    assert_eq!(queue.num_requeues(&"a"), 0);
    assert_eq!(queue.len(), 1, "forget must not dequeue");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_item_never_processed_concurrently() {
    let queue = WorkQueue::new("test");
    let in_flight: Arc<Mutex<HashSet<u32>>> = Arc::new(Mutex::new(HashSet::new()));
    let overlaps = Arc::new(Mutex::new(0u32));

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let in_flight = Arc::clone(&in_flight);
            let overlaps = Arc::clone(&overlaps);
            tokio::spawn(async move {
                while let Some(item) = queue.get().await {
                    if !in_flight.lock().insert(item) {
                        *overlaps.lock() += 1;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    in_flight.lock().remove(&item);
                    queue.done(&item);
                }
            })
        })
        .collect();

    for round in 0..50u32 {
        queue.add(round % 3);
        if round % 10 == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.shut_down();
    for consumer in consumers {
        consumer.await.unwrap();
    }

    assert_eq!(*overlaps.lock(), 0);
}
