//! Event recorders.
//!
//! A [`Recorder`] is a sink for [`Event`]s. Sync functions reach one through
//! their sync context; what the recorder does with an event is up to the
//! implementation.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::event::{Event, EventType};

/// Sink for operational events.
pub trait Recorder: Send + Sync + fmt::Debug {
    /// Name of the component events are attributed to.
    fn component_name(&self) -> &str;

    /// Record an event of the given type.
    fn record(&self, event_type: EventType, reason: &str, message: &str);

    /// Record a [`EventType::Normal`] event.
    fn event(&self, reason: &str, message: &str) {
        self.record(EventType::Normal, reason, message);
    }

    /// Record a [`EventType::Warning`] event.
    fn warning(&self, reason: &str, message: &str) {
        self.record(EventType::Warning, reason, message);
    }

    /// A recorder writing to the same sink with `-{suffix}` appended to the
    /// component name.
    fn with_component_suffix(&self, suffix: &str) -> Arc<dyn Recorder>;
}

fn suffixed(component: &str, suffix: &str) -> String {
    format!("{component}-{suffix}")
}

/// Recorder that emits events as `tracing` records.
#[derive(Debug, Clone)]
pub struct LoggingRecorder {
    component: String,
}

impl LoggingRecorder {
    /// Create a recorder for `component`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Recorder for LoggingRecorder {
    fn component_name(&self) -> &str {
        &self.component
    }

    fn record(&self, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => {
                info!(component = %self.component, reason, "{message}");
            }
            EventType::Warning => {
                warn!(component = %self.component, reason, "{message}");
            }
        }
    }

    fn with_component_suffix(&self, suffix: &str) -> Arc<dyn Recorder> {
        Arc::new(Self::new(suffixed(&self.component, suffix)))
    }
}

/// Recorder that keeps events in memory.
///
/// Recorders derived with [`Recorder::with_component_suffix`] share the same
/// event list, so a test can hand the base recorder to a factory and read
/// everything the controller recorded.
#[derive(Clone)]
pub struct InMemoryRecorder {
    component: String,
    events: Arc<RwLock<Vec<Event>>>,
}

impl fmt::Debug for InMemoryRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRecorder")
            .field("component", &self.component)
            .field("events", &self.events.read().len())
            .finish()
    }
}

impl InMemoryRecorder {
    /// Create an empty recorder for `component`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Recorded events with the given reason.
    pub fn events_with_reason(&self, reason: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|event| event.reason == reason)
            .cloned()
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Recorder for InMemoryRecorder {
    fn component_name(&self) -> &str {
        &self.component
    }

    fn record(&self, event_type: EventType, reason: &str, message: &str) {
        self.events
            .write()
            .push(Event::new(self.component.clone(), event_type, reason, message));
    }

    fn with_component_suffix(&self, suffix: &str) -> Arc<dyn Recorder> {
        Arc::new(Self {
            component: suffixed(&self.component, suffix),
            events: Arc::clone(&self.events),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_records_events() {
        let recorder = InMemoryRecorder::new("operator");
        recorder.event("Synced", "all good");
        recorder.warning("SyncFailed", "boom");

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events.first().map(|e| e.event_type),
            Some(EventType::Normal)
        );
        assert_eq!(
            events.last().map(|e| e.event_type),
            Some(EventType::Warning)
        );
        assert_eq!(recorder.events_with_reason("SyncFailed").len(), 1);
    }

    #[test]
    fn test_component_suffix_shares_sink() {
        let recorder = InMemoryRecorder::new("operator");
        let derived = recorder.with_component_suffix("SecretController");

        assert_eq!(derived.component_name(), "operator-SecretController");
        derived.event("Synced", "from derived");

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events.first().map(|e| e.component.as_str()),
            Some("operator-SecretController")
        );
    }

    #[test]
    fn test_logging_recorder_suffix() {
        let recorder = LoggingRecorder::new("operator");
        let derived = recorder.with_component_suffix("Ctrl");
        assert_eq!(derived.component_name(), "operator-Ctrl");
        derived.warning("Reason", "does not panic without a subscriber");
    }

    #[test]
    fn test_empty_recorder() {
        let recorder = InMemoryRecorder::new("operator");
        assert!(recorder.is_empty());
        assert_eq!(recorder.len(), 0);
    }
}
