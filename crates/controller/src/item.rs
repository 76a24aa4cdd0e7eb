//! Items carried by a controller's work queue.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use relevel_core::{ObjectKey, Resource};

/// Shared reference to an observed object, identified by its key.
///
/// Two refs are equal when their keys are, whatever their payloads, so a
/// newer observation of the same object replaces the older one in the queue.
pub struct ObjectRef<R> {
    key: ObjectKey,
    object: Arc<R>,
}

impl<R: Resource> ObjectRef<R> {
    /// Wrap an observed object.
    pub fn new(object: Arc<R>) -> Self {
        Self {
            key: object.key(),
            object,
        }
    }

    /// Identity of the object.
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// The object as last observed. Shared with the watch source.
    pub fn object(&self) -> &R {
        &self.object
    }
}

impl<R> Clone for ObjectRef<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            object: Arc::clone(&self.object),
        }
    }
}

impl<R> PartialEq for ObjectRef<R> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<R> Eq for ObjectRef<R> {}

impl<R> Hash for ObjectRef<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<R> fmt::Debug for ObjectRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.key).finish()
    }
}

/// What a controller queues in response to a watch notification.
pub enum WorkItem<R> {
    /// The changed object itself.
    Object(ObjectRef<R>),
    /// A fixed key; every notification collapses onto it.
    Key(String),
}

impl<R: Resource> WorkItem<R> {
    /// Work item for an observed object.
    pub fn object(object: Arc<R>) -> Self {
        Self::Object(ObjectRef::new(object))
    }
}

impl<R> WorkItem<R> {
    /// Work item for a plain key.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    /// The object reference, if this item carries one.
    pub fn as_object(&self) -> Option<&ObjectRef<R>> {
        match self {
            Self::Object(object) => Some(object),
            Self::Key(_) => None,
        }
    }

    /// The plain key, if this item is one.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Object(_) => None,
            Self::Key(key) => Some(key),
        }
    }
}

impl<R> Clone for WorkItem<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Object(object) => Self::Object(object.clone()),
            Self::Key(key) => Self::Key(key.clone()),
        }
    }
}

impl<R> PartialEq for WorkItem<R> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Key(a), Self::Key(b)) => a == b,
            _ => false,
        }
    }
}

impl<R> Eq for WorkItem<R> {}

impl<R> Hash for WorkItem<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Object(object) => object.hash(state),
            Self::Key(key) => key.hash(state),
        }
    }
}

impl<R> fmt::Display for WorkItem<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(object) => write!(f, "{}", object.key),
            Self::Key(key) => write!(f, "{key}"),
        }
    }
}

impl<R> fmt::Debug for WorkItem<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(object) => f.debug_tuple("Object").field(&object.key).finish(),
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
        }
    }
}
