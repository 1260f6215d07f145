//! Job runner abstraction and the HTTP caption-service runner.

use async_trait::async_trait;
use capgen_db::models::task::Task;

use crate::context::TaskContext;

/// Default caption service endpoint for local development.
const DEFAULT_CAPTION_API_URL: &str = "http://localhost:8080/v1/captions";

/// Error from a job runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Caption service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task was cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Executes one claimed task and produces its result payload.
///
/// Implementations own all network/AI interaction. They should poll
/// [`TaskContext::is_cancelled`] at convenient points and bail out with
/// [`RunnerError::Cancelled`]; the queue only flips the status and never
/// interrupts a run forcibly.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<serde_json::Value, RunnerError>;
}

/// Runner that posts the settings snapshot to the external caption service
/// and returns its JSON payload verbatim.
pub struct HttpCaptionRunner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCaptionRunner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Build from the `CAPTION_API_URL` environment variable.
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var("CAPTION_API_URL").unwrap_or_else(|_| DEFAULT_CAPTION_API_URL.into());
        Self::new(endpoint)
    }
}

#[async_trait]
impl JobRunner for HttpCaptionRunner {
    async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<serde_json::Value, RunnerError> {
        ctx.report_progress(5, Some("submitting")).await;
        if ctx.is_cancelled().await {
            return Err(RunnerError::Cancelled);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "task_id": task.id,
                "context_id": task.context_id,
                "settings": task.settings,
            }))
            .send()
            .await?
            .error_for_status()?;

        ctx.report_progress(80, Some("rendering")).await;

        let payload: serde_json::Value = response.json().await?;

        if ctx.is_cancelled().await {
            return Err(RunnerError::Cancelled);
        }
        Ok(payload)
    }
}
