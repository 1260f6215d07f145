use capgen_core::types::{DbId, TaskId};

/// Errors surfaced by the queue manager.
///
/// The manager performs no internal retries; a [`QueueError::Storage`]
/// failure means the whole call rolled back and the caller may retry it.
/// Permission and illegal-transition refusals are reported as `Ok(false)`
/// by the operations that define them, not as errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Owner {owner_id} already has a queued or running task")]
    DuplicateActiveTask { owner_id: DbId },

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
