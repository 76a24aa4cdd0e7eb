//! Controller runtime: cache sync, worker pool, periodic resync, shutdown.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use relevel_core::Resource;
use relevel_workqueue::RateLimitingQueue;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{BaseContext, SyncContext};
use crate::error::{Error, Result};
use crate::item::WorkItem;
use crate::sync::SyncFn;

/// How often cache sync status is polled before workers start.
const CACHE_SYNC_POLL: Duration = Duration::from_millis(100);

/// Reports whether one watch source has completed its initial listing.
pub type HasSynced = Arc<dyn Fn() -> bool + Send + Sync>;

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Built, not yet running.
    Created,
    /// Waiting for caches or processing items.
    Running,
    /// Cancelled; draining workers.
    ShuttingDown,
    /// Every worker and the resync task have exited.
    Stopped,
}

/// Observer of a controller's lifecycle, usable after `run` took the controller.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: watch::Receiver<ControllerState>,
}

impl ShutdownSignal {
    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Whether the controller has fully stopped.
    pub fn is_stopped(&self) -> bool {
        self.state() == ControllerState::Stopped
    }

    /// Resolve once no sync invocation can run anymore.
    ///
    /// Also resolves if the controller is dropped without being run.
    pub async fn wait(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|state| *state == ControllerState::Stopped)
            .await;
    }
}

/// Publishes state changes; reports `Stopped` however `run` exits.
struct StateGuard {
    tx: watch::Sender<ControllerState>,
}

impl StateGuard {
    fn set(&self, state: ControllerState) {
        self.tx.send_replace(state);
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.tx.send_replace(ControllerState::Stopped);
    }
}

/// A level-triggered controller.
///
/// Built by [`crate::Factory`]; started with [`Controller::run`].
pub struct Controller<R: Resource> {
    base: BaseContext<R>,
    sync: Arc<dyn SyncFn<R>>,
    caches: Vec<HasSynced>,
    resync_interval: Option<Duration>,
    state: watch::Sender<ControllerState>,
}

impl<R: Resource> fmt::Debug for Controller<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.base.controller_name())
            .field("caches", &self.caches.len())
            .field("resync_interval", &self.resync_interval)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<R: Resource> Controller<R> {
    pub(crate) fn new(
        base: BaseContext<R>,
        sync: Arc<dyn SyncFn<R>>,
        caches: Vec<HasSynced>,
        resync_interval: Option<Duration>,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState::Created);
        Self {
            base,
            sync,
            caches,
            resync_interval: resync_interval.filter(|interval| !interval.is_zero()),
            state,
        }
    }

    /// Controller name.
    pub fn name(&self) -> &str {
        self.base.controller_name()
    }

    /// The controller's queue.
    pub fn queue(&self) -> &RateLimitingQueue<WorkItem<R>> {
        self.base.queue()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Handle that observes this controller after it is moved into `run`.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            state: self.state.subscribe(),
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Waits for every watch source to sync, then processes the queue with
    /// `workers` concurrent workers (at least one) and, if configured, calls
    /// the sync function periodically with an empty context. Returns after
    /// every worker and the resync task have exited. If `cancel` fires before
    /// the caches sync, no worker is started.
    pub async fn run(self, cancel: CancellationToken, workers: usize) {
        let Self {
            base,
            sync,
            caches,
            resync_interval,
            state,
        } = self;
        let guard = StateGuard { tx: state };
        let name = base.controller_name().to_owned();
        let queue = base.queue().clone();

        guard.set(ControllerState::Running);
        info!(controller = %name, "Starting controller");

        if !wait_for_cache_sync(&cancel, &caches).await {
            info!(controller = %name, "Cancelled before caches synced");
            guard.set(ControllerState::ShuttingDown);
            queue.shut_down();
            return;
        }
        debug!(controller = %name, caches = caches.len(), "Caches synced");

        let workers = if workers == 0 {
            warn!(controller = %name, "Worker count of zero requested, using one");
            1
        } else {
            workers
        };

        let worker = Arc::new(Worker {
            base,
            sync,
            cancel: cancel.clone(),
        });
        let mut tasks = JoinSet::new();
        for id in 1..=workers {
            let worker = Arc::clone(&worker);
            tasks.spawn(async move { worker.run(id).await });
        }
        if let Some(interval) = resync_interval {
            let worker = Arc::clone(&worker);
            tasks.spawn(async move { worker.resync_every(interval).await });
        }
        info!(controller = %name, workers, "Controller running");

        cancel.cancelled().await;
        guard.set(ControllerState::ShuttingDown);
        info!(controller = %name, "Shutting down controller");
        queue.shut_down();

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(controller = %name, error = %e, "Worker task failed");
            }
        }
        info!(controller = %name, "Controller stopped");
    }
}

/// Poll until every cache reports synced. `false` if cancelled first.
async fn wait_for_cache_sync(cancel: &CancellationToken, caches: &[HasSynced]) -> bool {
    let mut poll = tokio::time::interval(CACHE_SYNC_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if caches.iter().all(|has_synced| has_synced()) {
            return true;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            _ = poll.tick() => {}
        }
    }
}

struct Worker<R: Resource> {
    base: BaseContext<R>,
    sync: Arc<dyn SyncFn<R>>,
    cancel: CancellationToken,
}

impl<R: Resource> Worker<R> {
    async fn run(&self, id: usize) {
        debug!(controller = %self.base.controller_name(), worker = id, "Worker started");
        while self.process_next_item().await {}
        debug!(controller = %self.base.controller_name(), worker = id, "Worker stopped");
    }

    /// Process one item. `false` once the queue is shut down or cancelled.
    async fn process_next_item(&self) -> bool {
        let queue = self.base.queue();
        let Some(item) = queue.get().await else {
            return false;
        };
        if self.cancel.is_cancelled() {
            queue.done(&item);
            return false;
        }

        match self.invoke(Some(item.clone())).await {
            Ok(()) => queue.forget(&item),
            Err(e) => {
                error!(
                    controller = %self.base.controller_name(),
                    item = %item,
                    error = %e,
                    "Failed to sync"
                );
                if queue.is_shutting_down() || self.cancel.is_cancelled() {
                    debug!(item = %item, "Not retrying during shutdown");
                } else {
                    queue.add_rate_limited(item.clone());
                }
            }
        }
        queue.done(&item);
        true
    }

    async fn resync_every(&self, interval: Duration) {
        let Some(first) = Instant::now().checked_add(interval) else {
            warn!(
                controller = %self.base.controller_name(),
                interval_secs = interval.as_secs(),
                "Resync interval out of range, periodic resync disabled"
            );
            return;
        };
        let mut ticker = tokio::time::interval_at(first, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!(controller = %self.base.controller_name(), "Periodic resync");
                    if let Err(e) = self.invoke(None).await {
                        warn!(
                            controller = %self.base.controller_name(),
                            error = %e,
                            "Periodic resync failed"
                        );
                    }
                }
            }
        }
    }

    /// Call the sync function, turning a panic into an error.
    async fn invoke(&self, item: Option<WorkItem<R>>) -> Result<()> {
        let ctx = SyncContext::derive(&self.base, item);
        let call = self.sync.sync(self.cancel.clone(), ctx);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::sync_failed(format!("{e:#}"))),
            Err(payload) => Err(Error::sync_panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned.as_ref()), "owned boom");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_cache_sync_waits_for_all() {
        let cancel = CancellationToken::new();
        let ready: HasSynced = Arc::new(|| true);
        assert!(wait_for_cache_sync(&cancel, &[Arc::clone(&ready), ready]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_sync_gives_up_on_cancel() {
        let cancel = CancellationToken::new();
        let never: HasSynced = Arc::new(|| false);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        assert!(!wait_for_cache_sync(&cancel, &[never]).await);
    }
}
