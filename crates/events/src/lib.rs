//! Operational event recording for relevel controllers.
//!
//! - **Events**: [`Event`] with a component, severity, reason and message
//! - **Recorders**: the [`Recorder`] sink trait, a `tracing`-backed
//!   [`LoggingRecorder`] and an [`InMemoryRecorder`] for tests
//!
//! # Example
//!
//! ```
//! use relevel_events::{InMemoryRecorder, Recorder};
//!
//! let recorder = InMemoryRecorder::new("operator");
//! let scoped = recorder.with_component_suffix("SecretController");
//! scoped.event("SecretSynced", "secret test/db synced");
//!
//! assert_eq!(recorder.events().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod event;
pub mod recorder;

// Re-export main types
pub use event::{Event, EventType};
pub use recorder::{InMemoryRecorder, LoggingRecorder, Recorder};
