//! Level-triggered controllers.
//!
//! A controller watches one or more sources of objects, queues a work item for
//! every change it is told about and calls a user-supplied sync function for
//! each item until the function succeeds.
//!
//! - **Sources**: [`WatchSource`] notifies [`ResourceEventHandler`]s of adds,
//!   updates and deletes; [`InMemorySource`] is a hand-driven implementation
//! - **Adapter**: [`QueueEventHandler`] turns notifications into [`WorkItem`]s
//! - **Context**: [`SyncContext`] gives each invocation its item, the queue and
//!   a scoped event recorder
//! - **Runtime**: [`Controller::run`] waits for caches, runs workers, retries
//!   failures with backoff and resyncs periodically
//! - **Factory**: [`Factory`] wires all of the above
//!
//! # Semantics
//!
//! The sync function is level-triggered: it receives the latest state of an
//! object, never the change that led to it. Notifications for the same object
//! that arrive before it is processed collapse into one invocation. An object
//! is never synced by two workers at once. A failed or panicking invocation is
//! retried with per-item exponential backoff; a success clears the backoff.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod factory;
pub mod handler;
pub mod item;
pub mod source;
pub mod sync;

// Re-export main types
pub use config::ControllerConfig;
pub use context::{BaseContext, SyncContext};
pub use controller::{Controller, ControllerState, HasSynced, ShutdownSignal};
pub use error::{Error, Result};
pub use factory::Factory;
pub use handler::{QueueEventHandler, QueueMode};
pub use item::{ObjectRef, WorkItem};
pub use source::{DeletedObject, InMemorySource, ResourceEventHandler, Tombstone, WatchSource};
pub use sync::{SyncFn, SyncResult};
