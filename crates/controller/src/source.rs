//! Watch sources and change notifications.
//!
//! A [`WatchSource`] owns a cache of observed objects and notifies registered
//! [`ResourceEventHandler`]s of adds, updates and deletes. [`InMemorySource`]
//! is a complete implementation driven by hand, used by tests and the demo
//! binary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use relevel_core::{ObjectKey, Resource};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Receiver of change notifications from a [`WatchSource`].
pub trait ResourceEventHandler<R>: Send + Sync {
    /// An object appeared.
    fn on_add(&self, object: Arc<R>);

    /// An object changed.
    fn on_update(&self, old: Arc<R>, new: Arc<R>);

    /// An object went away.
    fn on_delete(&self, object: DeletedObject<R>);
}

/// Observable collection of objects.
pub trait WatchSource<R>: Send + Sync {
    /// Register `handler`. Objects already in the cache are replayed to it as adds.
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<R>>);

    /// Whether the initial listing has been observed.
    fn has_synced(&self) -> bool;
}

/// Marker for a delete the source saw only after the fact.
///
/// `last_known` is the final state the source had cached, if any.
pub struct Tombstone<R> {
    /// Key of the deleted object.
    pub key: String,
    /// Last observed state.
    pub last_known: Option<Arc<R>>,
}

impl<R> fmt::Debug for Tombstone<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tombstone")
            .field("key", &self.key)
            .field("has_last_known", &self.last_known.is_some())
            .finish()
    }
}

/// Payload of a delete notification.
pub enum DeletedObject<R> {
    /// The deleted object, observed directly.
    Object(Arc<R>),
    /// The delete was inferred; the object may be missing.
    Tombstone(Tombstone<R>),
}

impl<R> DeletedObject<R> {
    /// The deleted object, unwrapping a tombstone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedEvent`] when a tombstone carries no object.
    pub fn into_object(self) -> Result<Arc<R>> {
        match self {
            Self::Object(object) => Ok(object),
            Self::Tombstone(Tombstone {
                last_known: Some(object),
                ..
            }) => Ok(object),
            Self::Tombstone(Tombstone {
                key,
                last_known: None,
            }) => Err(Error::malformed_event(format!(
                "tombstone for '{key}' carries no object"
            ))),
        }
    }
}

impl<R> fmt::Debug for DeletedObject<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Tombstone(tombstone) => f.debug_tuple("Tombstone").field(tombstone).finish(),
        }
    }
}

/// Watch source backed by an in-process map.
///
/// Mutations and their notifications are serialized per source: handlers see
/// changes in the order the cache applied them. A handler may read the source
/// but must not mutate it from inside a notification.
pub struct InMemorySource<R> {
    name: String,
    /// Held across a cache change and its notifications.
    dispatch: Mutex<()>,
    cache: RwLock<HashMap<ObjectKey, Arc<R>>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<R>>>>,
    synced: AtomicBool,
}

impl<R> fmt::Debug for InMemorySource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySource")
            .field("name", &self.name)
            .field("objects", &self.cache.read().len())
            .field("handlers", &self.handlers.read().len())
            .field("synced", &self.synced.load(Ordering::Acquire))
            .finish()
    }
}

impl<R: Resource> InMemorySource<R> {
    /// Create an empty, unsynced source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dispatch: Mutex::new(()),
            cache: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            synced: AtomicBool::new(false),
        }
    }

    /// Source name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare the initial listing complete.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
        debug!(source = %self.name, "Source synced");
    }

    /// Insert or replace an object, notifying an add or an update.
    pub fn apply(&self, object: R) -> Arc<R> {
        let new = Arc::new(object);
        let key = new.key();
        let _dispatch = self.dispatch.lock();
        let old = self.cache.write().insert(key.clone(), Arc::clone(&new));

        let handlers = self.handlers_snapshot();
        match old {
            Some(old) => {
                trace!(source = %self.name, key = %key, "Update");
                for handler in &handlers {
                    handler.on_update(Arc::clone(&old), Arc::clone(&new));
                }
            }
            None => {
                trace!(source = %self.name, key = %key, "Add");
                for handler in &handlers {
                    handler.on_add(Arc::clone(&new));
                }
            }
        }
        new
    }

    /// Remove an object and notify a direct delete.
    ///
    /// Returns the removed object, or `None` if it was not cached.
    pub fn delete(&self, key: &ObjectKey) -> Option<Arc<R>> {
        let _dispatch = self.dispatch.lock();
        let removed = self.cache.write().remove(key)?;
        trace!(source = %self.name, key = %key, "Delete");
        for handler in &self.handlers_snapshot() {
            handler.on_delete(DeletedObject::Object(Arc::clone(&removed)));
        }
        Some(removed)
    }

    /// Remove an object whose delete was missed, notifying a tombstone with
    /// its last known state.
    pub fn delete_unobserved(&self, key: &ObjectKey) -> Option<Arc<R>> {
        let _dispatch = self.dispatch.lock();
        let removed = self.cache.write().remove(key);
        trace!(source = %self.name, key = %key, "Delete via tombstone");
        for handler in &self.handlers_snapshot() {
            handler.on_delete(DeletedObject::Tombstone(Tombstone {
                key: key.to_string(),
                last_known: removed.clone(),
            }));
        }
        removed
    }

    /// Cached object by key.
    pub fn get(&self, key: &ObjectKey) -> Option<Arc<R>> {
        self.cache.read().get(key).cloned()
    }

    /// All cached objects, in key order.
    pub fn list(&self) -> Vec<Arc<R>> {
        self.cache
            .read()
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, object)| Arc::clone(object))
            .collect()
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn handlers_snapshot(&self) -> Vec<Arc<dyn ResourceEventHandler<R>>> {
        self.handlers.read().clone()
    }
}

impl<R: Resource> WatchSource<R> for InMemorySource<R> {
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<R>>) {
        let _dispatch = self.dispatch.lock();
        self.handlers.write().push(Arc::clone(&handler));
        for object in self.list() {
            handler.on_add(object);
        }
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    use relevel_core::ObjectMeta;
    use relevel_workqueue::RateLimitingQueue;

    use crate::handler::{QueueEventHandler, QueueMode};
    use crate::item::WorkItem;

    #[derive(Debug, Clone)]
    struct ConfigMap {
        meta: ObjectMeta,
        value: u32,
    }

    impl Resource for ConfigMap {
        fn meta(&self) -> &ObjectMeta {
            &self.meta
        }
    }

    fn config_map(name: &str, value: u32) -> ConfigMap {
        ConfigMap {
            meta: ObjectMeta::new(name).with_namespace("test"),
            value,
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl ResourceEventHandler<ConfigMap> for Recording {
        fn on_add(&self, object: Arc<ConfigMap>) {
            self.seen.lock().push(format!("add {}", object.value));
        }

        fn on_update(&self, old: Arc<ConfigMap>, new: Arc<ConfigMap>) {
            self.seen
                .lock()
                .push(format!("update {}->{}", old.value, new.value));
        }

        fn on_delete(&self, object: DeletedObject<ConfigMap>) {
            let entry = match object.into_object() {
                Ok(object) => format!("delete {}", object.value),
                Err(_) => "delete malformed".to_string(),
            };
            self.seen.lock().push(entry);
        }
    }

    /// Parks the first notification of `value == 2` until released.
    struct Gate {
        entered: Arc<Barrier>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ResourceEventHandler<ConfigMap> for Gate {
        fn on_add(&self, _object: Arc<ConfigMap>) {}

        fn on_update(&self, _old: Arc<ConfigMap>, new: Arc<ConfigMap>) {
            if new.value == 2 {
                self.entered.wait();
                let _ = self.release.lock().recv();
            }
        }

        fn on_delete(&self, _object: DeletedObject<ConfigMap>) {}
    }

    #[test]
    fn test_apply_notifies_add_then_update() {
        let source = InMemorySource::new("configmaps");
        let handler = Arc::new(Recording::default());
        source.add_event_handler(handler.clone());

        source.apply(config_map("a", 1));
        source.apply(config_map("a", 2));

        assert_eq!(*handler.seen.lock(), vec!["add 1", "update 1->2"]);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_new_handler_sees_existing_objects() {
        let source = InMemorySource::new("configmaps");
        source.apply(config_map("b", 2));
        source.apply(config_map("a", 1));

        let handler = Arc::new(Recording::default());
        source.add_event_handler(handler.clone());

        assert_eq!(*handler.seen.lock(), vec!["add 1", "add 2"]);
    }

    #[test]
    fn test_delete_and_tombstone() {
        let source = InMemorySource::new("configmaps");
        let handler = Arc::new(Recording::default());
        source.add_event_handler(handler.clone());
        source.apply(config_map("a", 1));
        source.apply(config_map("b", 2));

        assert!(source.delete(&ObjectKey::namespaced("test", "a")).is_some());
        assert!(
            source
                .delete_unobserved(&ObjectKey::namespaced("test", "b"))
                .is_some()
        );
        assert!(
            source
                .delete_unobserved(&ObjectKey::namespaced("test", "gone"))
                .is_none()
        );

        assert_eq!(
            *handler.seen.lock(),
            vec!["add 1", "add 2", "delete 1", "delete 2", "delete malformed"]
        );
        assert!(source.is_empty());
    }

    #[test]
    fn test_delete_of_unknown_object_is_silent() {
        let source: InMemorySource<ConfigMap> = InMemorySource::new("configmaps");
        let handler = Arc::new(Recording::default());
        source.add_event_handler(handler.clone());

        assert!(source.delete(&ObjectKey::namespaced("test", "a")).is_none());
        assert!(handler.seen.lock().is_empty());
    }

    #[test]
    fn test_sync_flag() {
        let source: InMemorySource<ConfigMap> = InMemorySource::new("configmaps");
        assert!(!source.has_synced());
        source.mark_synced();
        assert!(source.has_synced());
    }

    #[test]
    fn test_get_returns_latest() {
        let source = InMemorySource::new("configmaps");
        source.apply(config_map("a", 1));
        source.apply(config_map("a", 7));
        let cached = source.get(&ObjectKey::namespaced("test", "a")).unwrap();
        assert_eq!(cached.value, 7);
    }

    #[tokio::test]
    async fn test_racing_updates_reach_queue_in_cache_order() {
        // GIVEN: a handler that stalls while delivering v2, ahead of the queue adapter
        let source: Arc<InMemorySource<ConfigMap>> = Arc::new(InMemorySource::new("configmaps"));
        let entered = Arc::new(Barrier::new(2));
        let (release_tx, release_rx) = mpsc::channel();
        source.add_event_handler(Arc::new(Gate {
            entered: Arc::clone(&entered),
            release: Mutex::new(release_rx),
        }));
        let queue: RateLimitingQueue<WorkItem<ConfigMap>> =
            RateLimitingQueue::with_default_limiter("Ctrl");
        source.add_event_handler(Arc::new(QueueEventHandler::new(
            "Ctrl",
            queue.clone(),
            QueueMode::Object,
        )));
        source.apply(config_map("a", 1));

        // WHEN: v3 is applied from another thread while v2 is still being delivered
        let slow = {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                source.apply(config_map("a", 2));
            })
        };
        entered.wait();
        let fast = {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                source.apply(config_map("a", 3));
            })
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();
        slow.join().unwrap();
        fast.join().unwrap();

        // THEN: the queue hands out the state the cache ended with
        let cached = source.get(&ObjectKey::namespaced("test", "a")).unwrap();
        assert_eq!(cached.value, 3);
        let item = queue.get().await.unwrap();
        assert_eq!(item.as_object().map(|object| object.object().value), Some(3));
        assert!(queue.is_empty());
    }
}
