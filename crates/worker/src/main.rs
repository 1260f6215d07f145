use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capgen_events::EventBus;
use capgen_queue::{QueueConfig, TaskQueue};
use capgen_worker::{HttpCaptionRunner, ReaperLoop, WorkerConfig, WorkerLoop};

#[derive(Parser, Debug)]
#[command(name = "capgen-worker")]
#[command(about = "Caption generation worker", long_about = None)]
struct Args {
    /// Seconds to sleep between empty claim attempts.
    #[arg(long)]
    check_interval: Option<f64>,

    /// Log level (overridden by RUST_LOG when set).
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let mut config = WorkerConfig::from_env();
    if let Some(secs) = args.check_interval {
        config.check_interval = Duration::from_secs_f64(secs);
    }
    tracing::info!(worker = %config.worker_name, "Loaded worker configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = capgen_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;

    capgen_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    capgen_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Queue manager and runner ---
    let events = Arc::new(EventBus::default());
    let queue = TaskQueue::new(pool.clone(), QueueConfig::from_env(), Arc::clone(&events));
    let runner = Arc::new(HttpCaptionRunner::from_env());

    // --- Shutdown signal ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // --- Reaper ---
    let reaper = ReaperLoop::new(queue.clone(), config.clone());
    let reaper_cancel = cancel.clone();
    let reaper_handle = tokio::spawn(async move { reaper.run(reaper_cancel).await });

    // --- Worker loop (foreground; drains its in-flight task on shutdown) ---
    let worker = WorkerLoop::new(queue, pool.clone(), runner, config);
    worker.run(cancel.clone()).await;

    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    pool.close().await;
    tracing::info!("Graceful shutdown complete");

    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the worker shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
