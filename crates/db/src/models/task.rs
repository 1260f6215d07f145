//! Task entity models and DTOs for the caption job queue.

use capgen_core::types::{DbId, TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: DbId,
    pub context_id: DbId,
    pub status_id: StatusId,
    /// Settings snapshot captured at submission; immutable after creation.
    pub settings: serde_json::Value,
    /// Generated caption payload, set only on completion.
    pub results: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Advisory, worker-updated; never gates scheduling.
    pub progress_percent: i16,
    pub current_step: Option<String>,
    /// Label of the worker instance that claimed the task.
    pub claimed_by: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Task {
    /// Parsed status; `None` only if the row carries an id outside the
    /// seed data.
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }
}

/// DTO for submitting a new task.
///
/// `settings` is the already-validated snapshot serialized by the queue
/// manager; the repository stores it verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTask {
    pub owner_id: DbId,
    pub context_id: DbId,
    pub settings: serde_json::Value,
}

/// Aggregate queue counters returned by `TaskRepo::stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub total: i64,
    /// queued + running.
    pub active: i64,
}
