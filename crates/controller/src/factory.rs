//! Builder wiring sources, queue, recorder and sync function into a controller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use relevel_core::Resource;
use relevel_events::Recorder;
use relevel_workqueue::{RateLimiter, RateLimitingQueue, default_controller_rate_limiter};
use tracing::info;

use crate::config::ControllerConfig;
use crate::context::BaseContext;
use crate::controller::{Controller, HasSynced};
use crate::error::{Error, Result};
use crate::handler::{QueueEventHandler, QueueMode};
use crate::item::WorkItem;
use crate::source::{ResourceEventHandler, WatchSource};
use crate::sync::SyncFn;

/// Builder for [`Controller`]s.
///
/// A sync function is required; everything else is optional.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use relevel_controller::{Factory, InMemorySource, SyncContext};
/// use relevel_core::{ObjectMeta, Resource};
/// use relevel_events::LoggingRecorder;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Clone)]
/// struct Secret {
///     meta: ObjectMeta,
/// }
///
/// impl Resource for Secret {
///     fn meta(&self) -> &ObjectMeta {
///         &self.meta
///     }
/// }
///
/// let secrets = Arc::new(InMemorySource::<Secret>::new("secrets"));
/// let controller = Factory::new()
///     .with_source(Arc::clone(&secrets))
///     .with_sync(|_cancel: CancellationToken, ctx: SyncContext<Secret>| async move {
///         if let Some(meta) = ctx.object_meta() {
///             println!("syncing {}", meta.name);
///         }
///         anyhow::Ok(())
///     })
///     .resync_every(Duration::from_secs(60))
///     .build("SecretController", &LoggingRecorder::new("operator"));
///
/// assert!(controller.is_ok());
/// ```
pub struct Factory<R: Resource> {
    sync: Option<Arc<dyn SyncFn<R>>>,
    sources: Vec<Arc<dyn WatchSource<R>>>,
    resync_interval: Option<Duration>,
    singleton_key: bool,
    rate_limiter: Option<Arc<dyn RateLimiter<WorkItem<R>>>>,
}

impl<R: Resource> Default for Factory<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> fmt::Debug for Factory<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("has_sync", &self.sync.is_some())
            .field("sources", &self.sources.len())
            .field("resync_interval", &self.resync_interval)
            .field("singleton_key", &self.singleton_key)
            .field("custom_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}

impl<R: Resource> Factory<R> {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self {
            sync: None,
            sources: Vec::new(),
            resync_interval: None,
            singleton_key: false,
            rate_limiter: None,
        }
    }

    /// Set the sync function.
    #[must_use]
    pub fn with_sync(mut self, sync: impl SyncFn<R> + 'static) -> Self {
        self.sync = Some(Arc::new(sync));
        self
    }

    /// Replace the watch sources.
    #[must_use]
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn WatchSource<R>>>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    /// Add one watch source.
    #[must_use]
    pub fn with_source<S: WatchSource<R> + 'static>(mut self, source: Arc<S>) -> Self {
        self.sources.push(source);
        self
    }

    /// Call the sync function with an empty context every `interval`.
    ///
    /// A zero interval disables periodic resync.
    #[must_use]
    pub fn resync_every(mut self, interval: Duration) -> Self {
        self.resync_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Queue the fixed key `"{name}Key"` for every notification instead of
    /// the changed object.
    #[must_use]
    pub fn with_singleton_key(mut self) -> Self {
        self.singleton_key = true;
        self
    }

    /// Use `limiter` for retries instead of the default controller limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter<WorkItem<R>>>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Apply resync, queue mode and retry policy from `config`.
    ///
    /// Name and worker count are used by the caller when building and running.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn with_config(self, config: &ControllerConfig) -> Result<Self> {
        config.validate()?;
        let mut factory = self.with_rate_limiter(Arc::new(config.rate_limiter.build::<WorkItem<R>>()));
        factory.resync_interval = config.resync_interval();
        factory.singleton_key = config.singleton_key;
        Ok(factory)
    }

    /// Build a controller named `name`.
    ///
    /// Registers the queue adapter on every source, so objects already cached
    /// are queued before the controller runs. Events are recorded under
    /// `"{component}-{name}"` of `recorder`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSyncFunction`] if no sync function was set.
    pub fn build(self, name: impl Into<String>, recorder: &dyn Recorder) -> Result<Controller<R>> {
        let name = name.into();
        let sync = self.sync.ok_or_else(|| Error::missing_sync_function(&name))?;

        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(default_controller_rate_limiter::<WorkItem<R>>()));
        let queue = RateLimitingQueue::new(name.clone(), limiter);
        let mode = if self.singleton_key {
            QueueMode::singleton_for(&name)
        } else {
            QueueMode::Object
        };

        let handler: Arc<dyn ResourceEventHandler<R>> =
            Arc::new(QueueEventHandler::new(name.clone(), queue.clone(), mode.clone()));
        let caches: Vec<HasSynced> = self
            .sources
            .iter()
            .map(|source| {
                source.add_event_handler(Arc::clone(&handler));
                let source = Arc::clone(source);
                Arc::new(move || source.has_synced()) as HasSynced
            })
            .collect();

        info!(
            controller = %name,
            sources = caches.len(),
            mode = ?mode,
            resync_secs = self.resync_interval.map(|i| i.as_secs()),
            "Built controller"
        );

        let base = BaseContext::new(name.as_str(), queue, recorder.with_component_suffix(&name));
        Ok(Controller::new(base, sync, caches, self.resync_interval))
    }
}
