//! Error types for the scheduler module

use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Malformed schedule specification
    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    /// `start` called before any schedule was configured
    #[error("No schedule configured")]
    NotConfigured,

    /// `start` called while a run is already active
    #[error("Distribution already running")]
    AlreadyRunning,

    /// Transition attempted from an incompatible state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Durable write of the distribution state failed
    #[error("Failed to persist distribution state during '{operation}': {reason}")]
    PersistenceWrite { operation: String, reason: String },

    /// Persisted state could not be interpreted
    #[error("Persisted distribution state is corrupt: {reason}")]
    RecoveryDataCorrupt { reason: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error during '{operation}': {reason}")]
    Io { operation: String, reason: String },
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create an invalid schedule error
    pub fn invalid_schedule(reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create a persistence write error
    pub fn persistence_write(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PersistenceWrite {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt recovery data error
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::RecoveryDataCorrupt {
            reason: reason.into(),
        }
    }

    /// Create an IO error with context
    pub fn io_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Io {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// Persistence problems only degrade durability; the in-memory schedule
    /// keeps running and the next successful save re-synchronizes it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PersistenceWrite { .. }
                | Self::RecoveryDataCorrupt { .. }
                | Self::Storage(_)
                | Self::Io { .. }
        )
    }

    /// Check if the error is a rejected state transition
    pub fn is_transition_rejected(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured | Self::AlreadyRunning | Self::InvalidState { .. }
        )
    }
}
