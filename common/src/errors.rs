// Error handling framework

use thiserror::Error;
use uuid::Uuid;

/// Trigger configuration errors, raised while building a scheduler
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    #[error("Invalid tolerance {0}: must be a finite number greater than 0")]
    InvalidTolerance(f64),

    #[error("Invalid trigger point at index {index}: {reason}")]
    InvalidTriggerPoint { index: usize, reason: String },

    #[error("Malformed trigger list: {0}")]
    MalformedTriggerList(String),
}

/// Errors reported by a playback collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Player has been disposed")]
    Disposed,

    #[error("Playback request rejected: {0}")]
    Rejected(String),
}

/// Playback session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Progress sink failed: {0}")]
    ProgressSink(String),

    #[error("Session {0} has ended")]
    Closed(Uuid),
}

impl From<serde_json::Error> for TriggerError {
    fn from(err: serde_json::Error) -> Self {
        TriggerError::MalformedTriggerList(err.to_string())
    }
}
