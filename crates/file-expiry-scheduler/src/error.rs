//! Error types for the expiry scheduler.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by a [`QueueBackend`](crate::QueueBackend).
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend process could not be started.
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    /// The backend ran but refused the request (bad time spec, permissions).
    #[error("{0}")]
    Rejected(String),

    /// The job is no longer in the queue.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The backend answered with output we could not interpret.
    #[error("unexpected queue output: {0}")]
    Malformed(String),
}

/// Errors that can occur in expiry operations.
#[derive(Debug, Error)]
pub enum ExpiryError {
    /// Caller-supplied input was rejected before touching the queue.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The path could not be resolved to an inode.
    #[error("cannot resolve {}: {source}", path.display())]
    PathResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listing, inspecting or removing jobs failed.
    #[error("{0}")]
    BackendUnavailable(String),

    /// The queue refused the new job.
    #[error("queue rejected the job: {0}")]
    Scheduling(String),

    /// A job vanished between listing and inspection.
    #[error("job not found: {0}")]
    JobNotFound(String),
}

impl From<QueueError> for ExpiryError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => ExpiryError::JobNotFound(id),
            other => ExpiryError::BackendUnavailable(other.to_string()),
        }
    }
}
