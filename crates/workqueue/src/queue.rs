//! Deduplicating FIFO work queue.
//!
//! The queue tracks three sets of items:
//!
//! - **queue**: items waiting to be handed out, in FIFO order
//! - **dirty**: items that need processing (everything in `queue`, plus items
//!   re-added while they were being processed)
//! - **processing**: items handed out by [`WorkQueue::get`] and not yet
//!   acknowledged with [`WorkQueue::done`]
//!
//! An item is never in `queue` while it is in `processing`, which is what
//! serializes work on the same item across any number of consumers.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Anything that can be placed on a work queue.
///
/// Equality defines identity: equal items coalesce while pending.
pub trait QueueItem: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> QueueItem for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

impl<T: QueueItem> State<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            shutting_down: false,
        }
    }
}

enum Take<T> {
    Item(T),
    Empty,
    ShutDown,
}

struct Inner<T> {
    name: String,
    state: Mutex<State<T>>,
    notify: Notify,
    /// Cancels timers of pending delayed adds.
    shutdown: CancellationToken,
}

/// A deduplicating work queue with delayed insertion.
///
/// Cloning yields another handle to the same queue.
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: QueueItem> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WorkQueue")
            .field("name", &self.inner.name)
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}

impl<T: QueueItem> WorkQueue<T> {
    /// Create a new named queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::new()),
                notify: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queue name, used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark an item as needing processing.
    ///
    /// - already pending: the stored item is replaced by `item`, nothing else changes
    /// - currently processing: the item is re-queued once [`WorkQueue::done`] is called
    /// - shutting down: ignored
    pub fn add(&self, item: T) {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            trace!(queue = %self.inner.name, item = ?item, "Ignoring add on shut down queue");
            return;
        }
        if state.dirty.contains(&item) {
            state.dirty.replace(item);
            return;
        }

        let processing = state.processing.contains(&item);
        state.dirty.insert(item.clone());
        if processing {
            trace!(queue = %self.inner.name, item = ?item, "Item is processing, deferring");
            return;
        }

        state.queue.push_back(item);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Add an item once `delay` has elapsed.
    ///
    /// A zero delay adds immediately. Timers still pending at shutdown are
    /// dropped.
    pub fn add_after(&self, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                queue = %self.inner.name,
                delay_ms = delay.as_millis(),
                "No async runtime for delayed add, adding immediately"
            );
            self.add(item);
            return;
        };

        debug!(queue = %self.inner.name, item = ?item, delay_ms = delay.as_millis(), "Scheduling delayed add");
        let queue = self.clone();
        let shutdown = self.inner.shutdown.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => queue.add(item),
            }
        });
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shutting down. The returned item is
    /// marked as processing until [`WorkQueue::done`] is called for it.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // registered before the state check
            notified.as_mut().enable();

            match self.try_take() {
                Take::Item(item) => return Some(item),
                Take::ShutDown => return None,
                Take::Empty => notified.await,
            }
        }
    }

    fn try_take(&self) -> Take<T> {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return Take::ShutDown;
        }
        let Some(front) = state.queue.pop_front() else {
            return Take::Empty;
        };
        // dirty holds the most recently added payload for this identity
        let item = state.dirty.take(&front).unwrap_or(front);
        state.processing.insert(item.clone());
        Take::Item(item)
    }

    /// Acknowledge that processing of `item` finished.
    ///
    /// If the item was added again while processing, it goes back on the
    /// queue now.
    pub fn done(&self, item: &T) {
        let mut state = self.inner.state.lock();
        if !state.processing.remove(item) || state.shutting_down {
            return;
        }
        let Some(pending) = state.dirty.get(item).cloned() else {
            return;
        };
        state.queue.push_back(pending);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Close the queue.
    ///
    /// Every waiting [`WorkQueue::get`] returns `None`, later adds are
    /// ignored and pending delayed adds are cancelled.
    pub fn shut_down(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }
        debug!(queue = %self.inner.name, "Shutting down queue");
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    /// Whether [`WorkQueue::shut_down`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    /// Number of items waiting to be handed out.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no item is waiting to be handed out.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items currently handed out and not yet done.
    pub fn processing_len(&self) -> usize {
        self.inner.state.lock().processing.len()
    }
}
