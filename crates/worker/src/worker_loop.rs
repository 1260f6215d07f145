//! Polling worker loop: claim, execute, report.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use capgen_db::models::task::Task;
use capgen_db::DbPool;
use capgen_queue::TaskQueue;

use crate::config::WorkerConfig;
use crate::context::TaskContext;
use crate::runner::JobRunner;

/// Polling consumer that executes claimed tasks via a [`JobRunner`].
///
/// One logical loop per process; run several worker processes against the
/// same database for parallelism. One task's failure (runner error or
/// panic) becomes a failed task row and never ends the loop.
pub struct WorkerLoop {
    queue: TaskQueue,
    pool: DbPool,
    runner: Arc<dyn JobRunner>,
    config: WorkerConfig,
}

impl WorkerLoop {
    pub fn new(
        queue: TaskQueue,
        pool: DbPool,
        runner: Arc<dyn JobRunner>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            pool,
            runner,
            config,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// Shutdown stops new claims; a task already claimed finishes first.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker = %self.config.worker_name,
            check_interval_ms = self.config.check_interval.as_millis() as u64,
            "Worker loop started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.queue.claim_next(&self.config.worker_name).await {
                Ok(Some(task)) => self.execute(task).await,
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.check_interval) => {}
                    }
                }
                Err(e) => {
                    // Transient storage failure: back off one interval and
                    // try again. Retry policy lives here, not in the manager.
                    tracing::error!(error = %e, "Claim failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.check_interval) => {}
                    }
                }
            }
        }

        tracing::info!("Worker loop shutting down");
    }

    /// Execute one claimed task and report its outcome.
    async fn execute(&self, task: Task) {
        let task_id = task.id;
        tracing::info!(task_id = %task_id, owner_id = task.owner_id, "Executing task");

        let ctx = TaskContext::new(self.pool.clone(), task_id);
        let runner = Arc::clone(&self.runner);

        // A panicking runner surfaces as a JoinError here instead of taking
        // the loop down with it.
        let outcome = tokio::spawn(async move { runner.run(&task, &ctx).await }).await;

        let reported = match outcome {
            Ok(Ok(results)) => {
                tracing::info!(task_id = %task_id, "Task succeeded");
                self.queue.complete(task_id, results).await
            }
            Ok(Err(err)) => {
                tracing::warn!(task_id = %task_id, error = %err, "Task failed");
                self.queue.fail(task_id, &err.to_string()).await
            }
            Err(join_err) => {
                tracing::error!(task_id = %task_id, error = %join_err, "Job runner panicked");
                self.queue
                    .fail(task_id, &format!("Job runner panicked: {join_err}"))
                    .await
            }
        };

        match reported {
            Ok(true) => {}
            // The task left `running` while we held it (e.g. cancelled).
            Ok(false) => {
                tracing::warn!(task_id = %task_id, "Outcome dropped; task is no longer running")
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Failed to record task outcome")
            }
        }
    }
}
