//! Repository for the `tasks` table.
//!
//! Every status transition is a conditional update guarded by the current
//! status, so an illegal transition affects zero rows instead of corrupting
//! state. Uses `TaskStatus` from `models::status` for all status literals.

use sqlx::PgPool;
use uuid::Uuid;

use capgen_core::types::{DbId, TaskId};

use crate::models::status::{StatusId, TaskStatus, TERMINAL_STATUSES};
use crate::models::task::{QueueStats, SubmitTask, Task};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, owner_id, context_id, status_id, settings, results, error_message, \
    progress_percent, current_step, claimed_by, \
    created_at, started_at, completed_at, updated_at";

/// Maximum page size for history listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for history listing.
const DEFAULT_LIMIT: i64 = 50;

/// PostgreSQL advisory lock ID serializing claim transactions.
///
/// Claimers must observe a consistent running count: with the lock held,
/// the capacity check and the row pick commit as one unit.
pub const CLAIM_LOCK_ID: i64 = 562_149_837;

/// Provides CRUD operations for caption generation tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new queued task unless the owner already has an active one.
    ///
    /// The `NOT EXISTS` guard enforces the single-flight rule in the same
    /// statement as the insert; the `uq_tasks_owner_active` partial index
    /// backstops it against concurrent writers. Returns `None` when the
    /// guard rejects the insert.
    pub async fn submit(pool: &PgPool, input: &SubmitTask) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (id, owner_id, context_id, status_id, settings) \
             SELECT $1::uuid, $2::bigint, $3::bigint, $4::smallint, $5::jsonb \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM tasks \
                 WHERE owner_id = $2 AND status_id IN ($4, $6) \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(Uuid::now_v7())
            .bind(input.owner_id)
            .bind(input.context_id)
            .bind(TaskStatus::Queued.id())
            .bind(&input.settings)
            .bind(TaskStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the oldest queued task, respecting the global
    /// running bound.
    ///
    /// One transaction: an advisory lock serializes claimers, then a single
    /// `UPDATE ... RETURNING` picks the FIFO head with `FOR UPDATE SKIP
    /// LOCKED` and flips it to running with `started_at = NOW()`. Two
    /// concurrent calls never return the same row, and no call succeeds
    /// once `max_concurrent` tasks are running.
    pub async fn claim_next(
        pool: &PgPool,
        worker: &str,
        max_concurrent: i64,
    ) -> Result<Option<Task>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CLAIM_LOCK_ID)
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "UPDATE tasks \
             SET status_id = $1, started_at = NOW(), claimed_by = $2 \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status_id = $3 \
                   AND (SELECT COUNT(*) FROM tasks r WHERE r.status_id = $1) < $4 \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Running.id())
            .bind(worker)
            .bind(TaskStatus::Queued.id())
            .bind(max_concurrent)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Mark a running task completed with its result payload.
    ///
    /// Returns `None` when the task is not currently running; completing
    /// an already-terminal or still-queued task is a no-op.
    pub async fn complete(
        pool: &PgPool,
        task_id: TaskId,
        results: &serde_json::Value,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, results = $3, completed_at = NOW(), \
                 progress_percent = 100 \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(TaskStatus::Completed.id())
            .bind(results)
            .bind(TaskStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark a running task failed with an error message.
    ///
    /// Same guard as [`TaskRepo::complete`]: only a running task can fail.
    pub async fn fail(
        pool: &PgPool,
        task_id: TaskId,
        error: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(TaskStatus::Failed.id())
            .bind(error)
            .bind(TaskStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Cancel a queued or running task.
    ///
    /// Returns `true` if the task was cancelled, `false` if it was already
    /// in a terminal state (or does not exist).
    pub async fn cancel(pool: &PgPool, task_id: TaskId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(task_id)
        .bind(TaskStatus::Cancelled.id())
        .bind(TaskStatus::Queued.id())
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update progress percentage and the current step label.
    ///
    /// Advisory only; scheduling never reads these columns.
    pub async fn update_progress(
        pool: &PgPool,
        task_id: TaskId,
        percent: i16,
        step: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET progress_percent = $2, current_step = $3 WHERE id = $1")
            .bind(task_id)
            .bind(percent)
            .bind(step)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: TaskId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current status ID for a task.
    pub async fn status_of(pool: &PgPool, id: TaskId) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT status_id FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The owner's task currently queued or running, if any.
    pub async fn active_for_owner(
        pool: &PgPool,
        owner_id: DbId,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE owner_id = $1 AND status_id IN ($2, $3) \
             LIMIT 1"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(owner_id)
            .bind(TaskStatus::Queued.id())
            .bind(TaskStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Aggregate counts per status across the whole queue.
    pub async fn stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> =
            sqlx::query_as("SELECT status_id, COUNT(*) FROM tasks GROUP BY status_id")
                .fetch_all(pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status_id, count) in rows {
            match TaskStatus::from_id(status_id) {
                Some(TaskStatus::Queued) => stats.queued = count,
                Some(TaskStatus::Running) => stats.running = count,
                Some(TaskStatus::Completed) => stats.completed = count,
                Some(TaskStatus::Failed) => stats.failed = count,
                Some(TaskStatus::Cancelled) => stats.cancelled = count,
                None => tracing::warn!(status_id, count, "Unknown status id in stats"),
            }
            stats.total += count;
        }
        stats.active = stats.queued + stats.running;
        Ok(stats)
    }

    /// The owner's tasks, newest first. `limit` defaults to 50, capped at 100.
    pub async fn history(
        pool: &PgPool,
        owner_id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(owner_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete terminal tasks whose completion predates the cutoff.
    ///
    /// Returns the number of rows removed.
    pub async fn purge_terminal_older_than(
        pool: &PgPool,
        hours: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM tasks \
             WHERE status_id IN ($1, $2, $3) \
               AND completed_at < NOW() - ($4 * INTERVAL '1 hour')",
        )
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(hours)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Force-fail running tasks whose `started_at` exceeds the max runtime.
    ///
    /// Stale-task policy for workers that died without reporting; returns
    /// the number of tasks failed.
    pub async fn fail_stale_running(
        pool: &PgPool,
        max_runtime_secs: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = $1, error_message = $2, completed_at = NOW() \
             WHERE status_id = $3 \
               AND started_at < NOW() - ($4 * INTERVAL '1 second')",
        )
        .bind(TaskStatus::Failed.id())
        .bind("Task exceeded the maximum runtime and was reaped")
        .bind(TaskStatus::Running.id())
        .bind(max_runtime_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
