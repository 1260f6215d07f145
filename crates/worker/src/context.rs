//! Per-task handle given to the job runner.

use capgen_core::types::TaskId;
use capgen_db::models::status::TaskStatus;
use capgen_db::repositories::TaskRepo;
use capgen_db::DbPool;

/// Handle for advisory progress writes and cooperative cancellation checks.
///
/// Progress values never influence scheduling, so storage hiccups here are
/// logged and dropped rather than failing the run.
#[derive(Clone)]
pub struct TaskContext {
    pool: DbPool,
    task_id: TaskId,
}

impl TaskContext {
    pub fn new(pool: DbPool, task_id: TaskId) -> Self {
        Self { pool, task_id }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Record progress (clamped to 0..=100) and the current step label.
    pub async fn report_progress(&self, percent: i16, step: Option<&str>) {
        let percent = percent.clamp(0, 100);
        if let Err(e) = TaskRepo::update_progress(&self.pool, self.task_id, percent, step).await {
            tracing::warn!(task_id = %self.task_id, error = %e, "Progress update failed");
        }
    }

    /// Whether the task was cancelled out from under the runner.
    ///
    /// Runners should poll this at convenient points and bail out with
    /// [`RunnerError::Cancelled`](crate::runner::RunnerError::Cancelled).
    pub async fn is_cancelled(&self) -> bool {
        match TaskRepo::status_of(&self.pool, self.task_id).await {
            Ok(Some(status_id)) => status_id == TaskStatus::Cancelled.id(),
            // Row gone (purged mid-run): nothing left to produce.
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(task_id = %self.task_id, error = %e, "Status poll failed");
                false
            }
        }
    }
}
