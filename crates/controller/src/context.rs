//! Per-invocation view handed to sync functions.

use std::fmt;
use std::sync::Arc;

use relevel_core::{ObjectMeta, Resource};
use relevel_events::Recorder;
use relevel_workqueue::RateLimitingQueue;

use crate::item::WorkItem;

/// Controller-wide state shared by every invocation.
pub struct BaseContext<R> {
    controller_name: Arc<str>,
    queue: RateLimitingQueue<WorkItem<R>>,
    recorder: Arc<dyn Recorder>,
}

impl<R> Clone for BaseContext<R> {
    fn clone(&self) -> Self {
        Self {
            controller_name: Arc::clone(&self.controller_name),
            queue: self.queue.clone(),
            recorder: Arc::clone(&self.recorder),
        }
    }
}

impl<R: Resource> fmt::Debug for BaseContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseContext")
            .field("controller_name", &self.controller_name)
            .field("queue", &self.queue)
            .field("recorder", &self.recorder)
            .finish()
    }
}

impl<R: Resource> BaseContext<R> {
    /// Create the shared context of a controller.
    pub fn new(
        controller_name: impl Into<Arc<str>>,
        queue: RateLimitingQueue<WorkItem<R>>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            controller_name: controller_name.into(),
            queue,
            recorder,
        }
    }

    /// Controller name.
    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    /// The controller's queue.
    pub fn queue(&self) -> &RateLimitingQueue<WorkItem<R>> {
        &self.queue
    }

    /// The controller's event recorder.
    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }
}

/// What a sync function sees for one invocation.
///
/// Carries the item being processed, or nothing when the invocation is a
/// periodic resync.
pub struct SyncContext<R> {
    base: BaseContext<R>,
    item: Option<WorkItem<R>>,
}

impl<R: Resource> fmt::Debug for SyncContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("controller", &self.base.controller_name)
            .field("item", &self.item)
            .finish()
    }
}

impl<R: Resource> SyncContext<R> {
    /// Derive an invocation context from the controller's base context.
    pub fn derive(base: &BaseContext<R>, item: Option<WorkItem<R>>) -> Self {
        Self {
            base: base.clone(),
            item,
        }
    }

    /// Name of the controller running this invocation.
    pub fn controller_name(&self) -> &str {
        self.base.controller_name()
    }

    /// The controller's queue. Sync functions may add follow-up work to it.
    pub fn queue(&self) -> &RateLimitingQueue<WorkItem<R>> {
        self.base.queue()
    }

    /// Event recorder scoped to this controller.
    pub fn events(&self) -> &dyn Recorder {
        self.base.recorder().as_ref()
    }

    /// The raw item, if any.
    pub fn item(&self) -> Option<&WorkItem<R>> {
        self.item.as_ref()
    }

    /// Metadata of the queued object.
    ///
    /// `None` on resync and in singleton key mode.
    pub fn object_meta(&self) -> Option<&ObjectMeta> {
        self.item
            .as_ref()
            .and_then(WorkItem::as_object)
            .map(|object| object.object().meta())
    }

    /// An independent copy of the queued object, safe to mutate.
    ///
    /// `None` on resync and in singleton key mode.
    pub fn queue_object(&self) -> Option<R> {
        self.item
            .as_ref()
            .and_then(WorkItem::as_object)
            .map(|object| object.object().clone())
    }

    /// The queued key in singleton key mode.
    pub fn queue_key(&self) -> Option<&str> {
        self.item.as_ref().and_then(WorkItem::as_key)
    }

    /// Whether this invocation is a periodic resync.
    pub fn is_resync(&self) -> bool {
        self.item.is_none()
    }
}
