//! Error types for the controller crate.

use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types.
#[derive(Debug, Error)]
pub enum Error {
    /// A controller was built without a sync function.
    #[error("controller '{controller}' has no sync function")]
    MissingSyncFunction { controller: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A delete notification carried neither an object nor a usable tombstone.
    #[error("malformed delete event: {reason}")]
    MalformedEvent { reason: String },

    /// The sync function returned an error.
    #[error("sync failed: {reason}")]
    SyncFailed { reason: String },

    /// The sync function panicked.
    #[error("sync panicked: {reason}")]
    SyncPanicked { reason: String },

    /// Error from the core crate (config loading, keys).
    #[error(transparent)]
    Core(#[from] relevel_core::Error),
}

impl Error {
    /// Create a missing sync function error.
    pub fn missing_sync_function(controller: impl Into<String>) -> Self {
        Self::MissingSyncFunction {
            controller: controller.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a malformed event error.
    pub fn malformed_event(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Create a sync failed error.
    pub fn sync_failed(reason: impl Into<String>) -> Self {
        Self::SyncFailed {
            reason: reason.into(),
        }
    }

    /// Create a sync panicked error.
    pub fn sync_panicked(reason: impl Into<String>) -> Self {
        Self::SyncPanicked {
            reason: reason.into(),
        }
    }
}
