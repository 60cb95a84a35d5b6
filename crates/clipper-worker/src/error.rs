//! Worker error types.

use thiserror::Error;

use clipper_models::{ErrorKind, JobId, ValidationError};

/// Why a submission was refused.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error("Job queue is full ({0} waiting)")]
    QueueFull(usize),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Job {0} already exists")]
    Duplicate(JobId),
}

impl DispatchError {
    /// Error kind for request failures that belong to the job taxonomy.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DispatchError::InvalidInput(_) => Some(ErrorKind::InvalidInput),
            _ => None,
        }
    }
}

pub type PublishResult<T> = Result<T, PublishError>;

/// Artifact publication and retrieval errors.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Job {0} has not succeeded")]
    NotSucceeded(JobId),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::NotFound(_) => ErrorKind::NotFound,
            PublishError::NotSucceeded(_) | PublishError::Io(_) => ErrorKind::TrimFailed,
        }
    }
}
