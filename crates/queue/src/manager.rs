//! The task queue manager.
//!
//! [`TaskQueue`] drives every state transition in the task lifecycle and is
//! the only path to the `tasks` table. Any number of worker processes may
//! hold a clone against the same database; all coordination happens in the
//! conditional statements of `TaskRepo`.

use std::sync::Arc;

use capgen_core::authorize::{Authorizer, OwnerOrAdmin};
use capgen_core::settings::CaptionSettings;
use capgen_core::types::{DbId, TaskId};
use capgen_db::models::status::TaskStatus;
use capgen_db::models::task::{QueueStats, SubmitTask, Task};
use capgen_db::repositories::TaskRepo;
use capgen_db::DbPool;
use capgen_events::{
    EventBus, TaskEvent, TASK_CANCELLED, TASK_COMPLETED, TASK_CREATED, TASK_FAILED, TASK_STARTED,
};

use crate::error::QueueError;

/// Default global bound on simultaneously running tasks.
const DEFAULT_MAX_CONCURRENT: i64 = 3;

/// Queue manager configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Global bound on simultaneously running tasks.
    pub max_concurrent: i64,
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `MAX_CONCURRENT_TASKS` | `3`     |
    pub fn from_env() -> Self {
        let max_concurrent: i64 = std::env::var("MAX_CONCURRENT_TASKS")
            .unwrap_or_else(|_| DEFAULT_MAX_CONCURRENT.to_string())
            .parse()
            .expect("MAX_CONCURRENT_TASKS must be a valid integer");
        Self { max_concurrent }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// The task queue manager. Cheap to clone; all state lives in Postgres.
#[derive(Clone)]
pub struct TaskQueue {
    pool: DbPool,
    config: QueueConfig,
    events: Arc<EventBus>,
    authorizer: Arc<dyn Authorizer>,
}

impl TaskQueue {
    /// Create a manager with the default owner-or-admin cancel policy.
    pub fn new(pool: DbPool, config: QueueConfig, events: Arc<EventBus>) -> Self {
        Self {
            pool,
            config,
            events,
            authorizer: Arc::new(OwnerOrAdmin),
        }
    }

    /// Replace the cancellation policy.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Admit a new task for `owner_id` against platform connection
    /// `context_id`.
    ///
    /// Rejects malformed settings before any write, and enforces the
    /// single-flight rule: one queued or running task per owner.
    pub async fn enqueue(
        &self,
        owner_id: DbId,
        context_id: DbId,
        settings: &CaptionSettings,
    ) -> Result<Task, QueueError> {
        settings
            .ensure_valid()
            .map_err(|e| QueueError::Validation(e.to_string()))?;

        let input = SubmitTask {
            owner_id,
            context_id,
            settings: serde_json::to_value(settings)
                .map_err(|e| QueueError::Validation(format!("Settings not serializable: {e}")))?,
        };

        let task = match TaskRepo::submit(&self.pool, &input).await {
            Ok(Some(task)) => task,
            Ok(None) => return Err(QueueError::DuplicateActiveTask { owner_id }),
            // A concurrent enqueue can slip past the NOT EXISTS guard and
            // land on the partial unique index instead.
            Err(e) if is_active_unique_violation(&e) => {
                return Err(QueueError::DuplicateActiveTask { owner_id })
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(task_id = %task.id, owner_id, context_id, "Task enqueued");
        self.events
            .publish(TaskEvent::new(TASK_CREATED, task.id, task.owner_id));

        Ok(task)
    }

    /// Claim the oldest queued task for `worker`, respecting the global
    /// running bound. `None` when the queue is empty or capacity is
    /// exhausted.
    pub async fn claim_next(&self, worker: &str) -> Result<Option<Task>, QueueError> {
        let claimed = TaskRepo::claim_next(&self.pool, worker, self.config.max_concurrent).await?;

        if let Some(task) = &claimed {
            tracing::info!(task_id = %task.id, worker, "Task claimed");
            self.events
                .publish(TaskEvent::new(TASK_STARTED, task.id, task.owner_id));
        }

        Ok(claimed)
    }

    /// Finish a running task successfully.
    ///
    /// Returns `false` when the task is not currently running (already
    /// terminal, still queued, or purged); the outcome is dropped.
    pub async fn complete(
        &self,
        task_id: TaskId,
        results: serde_json::Value,
    ) -> Result<bool, QueueError> {
        match TaskRepo::complete(&self.pool, task_id, &results).await? {
            Some(task) => {
                tracing::info!(task_id = %task.id, owner_id = task.owner_id, "Task completed");
                self.events
                    .publish(TaskEvent::new(TASK_COMPLETED, task.id, task.owner_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Finish a running task with an error. Same contract as
    /// [`TaskQueue::complete`].
    pub async fn fail(&self, task_id: TaskId, error_message: &str) -> Result<bool, QueueError> {
        match TaskRepo::fail(&self.pool, task_id, error_message).await? {
            Some(task) => {
                tracing::warn!(
                    task_id = %task.id,
                    owner_id = task.owner_id,
                    error = error_message,
                    "Task failed",
                );
                self.events.publish(
                    TaskEvent::new(TASK_FAILED, task.id, task.owner_id)
                        .with_payload(serde_json::json!({ "error": error_message })),
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel a queued or running task on behalf of `requester_id`.
    ///
    /// An unauthorized requester and an already-terminal task both get
    /// `Ok(false)`; an unknown id is [`QueueError::NotFound`]. The flip to
    /// cancelled is all this does; a running job aborts cooperatively
    /// when its runner next polls the status.
    pub async fn cancel(
        &self,
        task_id: TaskId,
        requester_id: DbId,
        is_admin: bool,
    ) -> Result<bool, QueueError> {
        let task = TaskRepo::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(QueueError::NotFound(task_id))?;

        if !self
            .authorizer
            .can_cancel(requester_id, is_admin, task.owner_id)
        {
            tracing::warn!(task_id = %task_id, requester_id, "Cancel denied");
            return Ok(false);
        }

        let cancelled = TaskRepo::cancel(&self.pool, task_id).await?;
        if cancelled {
            tracing::info!(task_id = %task_id, requester_id, "Task cancelled");
            self.events
                .publish(TaskEvent::new(TASK_CANCELLED, task_id, task.owner_id));
        }

        Ok(cancelled)
    }

    /// Current status of a task, if it exists.
    pub async fn status_of(&self, task_id: TaskId) -> Result<Option<TaskStatus>, QueueError> {
        Ok(TaskRepo::status_of(&self.pool, task_id)
            .await?
            .and_then(TaskStatus::from_id))
    }

    /// The owner's task currently queued or running, if any.
    pub async fn active_task_for(&self, owner_id: DbId) -> Result<Option<Task>, QueueError> {
        Ok(TaskRepo::active_for_owner(&self.pool, owner_id).await?)
    }

    /// Advisory progress update; never consulted by scheduling.
    pub async fn update_progress(
        &self,
        task_id: TaskId,
        percent: i16,
        step: Option<&str>,
    ) -> Result<(), QueueError> {
        Ok(TaskRepo::update_progress(&self.pool, task_id, percent, step).await?)
    }

    /// Aggregate queue counters.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(TaskRepo::stats(&self.pool).await?)
    }

    /// The owner's tasks, newest first.
    pub async fn history(
        &self,
        owner_id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<Task>, QueueError> {
        Ok(TaskRepo::history(&self.pool, owner_id, limit).await?)
    }

    /// Delete terminal tasks completed more than `hours` ago; returns the
    /// number removed.
    pub async fn purge_terminal_older_than(&self, hours: i32) -> Result<u64, QueueError> {
        let removed = TaskRepo::purge_terminal_older_than(&self.pool, hours).await?;
        if removed > 0 {
            tracing::info!(removed, hours, "Purged terminal tasks past retention");
        }
        Ok(removed)
    }

    /// Force-fail running tasks older than `max_runtime_secs`; returns the
    /// number failed.
    pub async fn fail_stale_running(&self, max_runtime_secs: i64) -> Result<u64, QueueError> {
        let failed = TaskRepo::fail_stale_running(&self.pool, max_runtime_secs).await?;
        if failed > 0 {
            tracing::warn!(failed, max_runtime_secs, "Force-failed stale running tasks");
        }
        Ok(failed)
    }
}

/// A 23505 on the active-task partial unique index means a concurrent
/// enqueue won the race.
fn is_active_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some("uq_tasks_owner_active")
        }
        _ => false,
    }
}
