//! Adapter from watch notifications to queue entries.

use std::sync::Arc;

use relevel_core::Resource;
use relevel_workqueue::RateLimitingQueue;
use tracing::{error, trace};

use crate::item::WorkItem;
use crate::source::{DeletedObject, ResourceEventHandler};

/// How notifications are turned into work items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMode {
    /// Queue the changed object.
    Object,
    /// Queue one fixed key for every notification.
    SingletonKey(String),
}

impl QueueMode {
    /// Singleton mode keyed `"{controller}Key"`.
    pub fn singleton_for(controller: &str) -> Self {
        Self::SingletonKey(format!("{controller}Key"))
    }
}

/// [`ResourceEventHandler`] that enqueues every notification.
///
/// Updates queue the new state. Deletes queue the deleted object, unwrapping
/// tombstones; a tombstone without an object is logged and dropped.
pub struct QueueEventHandler<R> {
    controller: String,
    queue: RateLimitingQueue<WorkItem<R>>,
    mode: QueueMode,
}

impl<R: Resource> QueueEventHandler<R> {
    /// Create an adapter feeding `queue`.
    pub fn new(
        controller: impl Into<String>,
        queue: RateLimitingQueue<WorkItem<R>>,
        mode: QueueMode,
    ) -> Self {
        Self {
            controller: controller.into(),
            queue,
            mode,
        }
    }

    fn enqueue(&self, object: Arc<R>) {
        let item = match &self.mode {
            QueueMode::Object => WorkItem::object(object),
            QueueMode::SingletonKey(key) => WorkItem::key(key.clone()),
        };
        trace!(controller = %self.controller, item = %item, "Enqueue");
        self.queue.add(item);
    }
}

impl<R: Resource> ResourceEventHandler<R> for QueueEventHandler<R> {
    fn on_add(&self, object: Arc<R>) {
        self.enqueue(object);
    }

    fn on_update(&self, _old: Arc<R>, new: Arc<R>) {
        self.enqueue(new);
    }

    fn on_delete(&self, object: DeletedObject<R>) {
        match object.into_object() {
            Ok(object) => self.enqueue(object),
            Err(e) => {
                error!(
                    controller = %self.controller,
                    error = %e,
                    "Dropping delete notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Tombstone;
    use relevel_core::ObjectMeta;

    #[derive(Debug, Clone)]
    struct Secret {
        meta: ObjectMeta,
        version: u32,
    }

    impl Resource for Secret {
        fn meta(&self) -> &ObjectMeta {
            &self.meta
        }
    }

    fn secret(name: &str, version: u32) -> Arc<Secret> {
        Arc::new(Secret {
            meta: ObjectMeta::new(name).with_namespace("test"),
            version,
        })
    }

    fn handler(mode: QueueMode) -> (QueueEventHandler<Secret>, RateLimitingQueue<WorkItem<Secret>>) {
        let queue = RateLimitingQueue::with_default_limiter("Ctrl");
        (QueueEventHandler::new("Ctrl", queue.clone(), mode), queue)
    }

    #[tokio::test]
    async fn test_update_queues_new_state() {
        let (handler, queue) = handler(QueueMode::Object);
        handler.on_update(secret("db", 1), secret("db", 2));

        let item = queue.get().await;
        let version = item
            .as_ref()
            .and_then(WorkItem::as_object)
            .map(|o| o.object().version);
        assert_eq!(version, Some(2));
    }

    #[tokio::test]
    async fn test_tombstone_is_unwrapped() {
        let (handler, queue) = handler(QueueMode::Object);
        handler.on_delete(DeletedObject::Tombstone(Tombstone {
            key: "test/db".to_string(),
            last_known: Some(secret("db", 3)),
        }));

        assert_eq!(queue.len(), 1);
        let item = queue.get().await;
        assert_eq!(item.map(|i| i.to_string()), Some("test/db".to_string()));
    }

    #[tokio::test]
    async fn test_empty_tombstone_is_dropped() {
        let (handler, queue) = handler(QueueMode::Object);
        handler.on_delete(DeletedObject::Tombstone(Tombstone {
            key: "test/db".to_string(),
            last_known: None,
        }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_singleton_mode_collapses_everything() {
        let (handler, queue) = handler(QueueMode::singleton_for("Ctrl"));
        handler.on_add(secret("a", 1));
        handler.on_add(secret("b", 1));
        handler.on_delete(DeletedObject::Object(secret("c", 1)));

        assert_eq!(queue.len(), 1);
        let item = queue.get().await;
        assert_eq!(item.as_ref().and_then(WorkItem::as_key), Some("CtrlKey"));
    }
}
