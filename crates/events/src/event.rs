//! Recorded operational events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Something happened as expected.
    Normal,
    /// Something went wrong or needs attention.
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// A human-readable operational event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Component that emitted the event, e.g. `operator-SecretController`.
    pub component: String,
    /// Severity.
    pub event_type: EventType,
    /// Short machine-friendly reason, e.g. `SecretUpdated`.
    pub reason: String,
    /// Free-form message.
    pub message: String,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(
        component: impl Into<String>,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            event_type,
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
