//! Retention reaper for terminal tasks.

use tokio_util::sync::CancellationToken;

use capgen_queue::{QueueError, TaskQueue};

use crate::config::WorkerConfig;

/// Background service that purges terminal tasks past the retention window
/// and force-fails stale running tasks.
pub struct ReaperLoop {
    queue: TaskQueue,
    config: WorkerConfig,
}

impl ReaperLoop {
    pub fn new(queue: TaskQueue, config: WorkerConfig) -> Self {
        Self { queue, config }
    }

    /// Run the reaper loop.
    ///
    /// One maintenance pass per `reap_interval` tick (the first fires at
    /// startup). The loop exits when the provided [`CancellationToken`] is
    /// cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.reap_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reaper cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.reap().await {
                        tracing::error!(error = %e, "Reaper pass failed");
                    }
                }
            }
        }
    }

    /// One maintenance pass.
    async fn reap(&self) -> Result<(), QueueError> {
        self.queue
            .purge_terminal_older_than(self.config.retention_hours)
            .await?;

        if let Some(max_runtime) = self.config.max_runtime_secs {
            self.queue.fail_stale_running(max_runtime).await?;
        }

        Ok(())
    }
}
