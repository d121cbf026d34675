//! Error types of the sync layer.

use thiserror::Error;

use crate::domain::{TaskId, ValidationError};
use crate::infrastructure::RemoteError;

/// Error returned by coordinator and subtask store operations.
///
/// When an operation returns `Err`, the local stores have already been
/// restored; callers never need to undo anything themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Rejected before anything was applied.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The task is not in the local store.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// The remote call failed; the optimistic change was rolled back.
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// A later request for the same entity was issued while this one was in
    /// flight, so this response was discarded without touching the store.
    #[error("Superseded by a newer request")]
    Superseded,
}

impl SyncError {
    /// Returns `true` if the failure came from the remote call.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Error type for local persistence of the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not hold a valid task list.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
