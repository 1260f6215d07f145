//! Worker configuration loaded from environment variables.

use std::time::Duration;

/// Worker configuration.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables; the CLI flags on the
/// worker binary take precedence for the fields they expose.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between empty claim attempts (default: `1s`).
    pub check_interval: Duration,
    /// Label recorded on claimed tasks (default: `worker-<pid>`).
    pub worker_name: String,
    /// Interval between reaper passes (default: `1h`).
    pub reap_interval: Duration,
    /// Terminal-task retention window in hours (default: `72`).
    pub retention_hours: i32,
    /// Force-fail running tasks older than this many seconds (default: off).
    pub max_runtime_secs: Option<i64>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default        |
    /// |-----------------------|----------------|
    /// | `CHECK_INTERVAL_SECS` | `1.0`          |
    /// | `WORKER_NAME`         | `worker-<pid>` |
    /// | `REAP_INTERVAL_SECS`  | `3600`         |
    /// | `RETENTION_HOURS`     | `72`           |
    /// | `MAX_RUNTIME_SECS`    | unset          |
    pub fn from_env() -> Self {
        let check_interval_secs: f64 = std::env::var("CHECK_INTERVAL_SECS")
            .unwrap_or_else(|_| "1.0".into())
            .parse()
            .expect("CHECK_INTERVAL_SECS must be a valid number of seconds");

        let worker_name = std::env::var("WORKER_NAME")
            .unwrap_or_else(|_| format!("worker-{}", std::process::id()));

        let reap_interval_secs: u64 = std::env::var("REAP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("REAP_INTERVAL_SECS must be a valid u64");

        let retention_hours: i32 = std::env::var("RETENTION_HOURS")
            .unwrap_or_else(|_| "72".into())
            .parse()
            .expect("RETENTION_HOURS must be a valid i32");

        let max_runtime_secs: Option<i64> = std::env::var("MAX_RUNTIME_SECS")
            .ok()
            .map(|v| v.parse().expect("MAX_RUNTIME_SECS must be a valid i64"));

        Self {
            check_interval: Duration::from_secs_f64(check_interval_secs),
            worker_name,
            reap_interval: Duration::from_secs(reap_interval_secs),
            retention_hours,
            max_runtime_secs,
        }
    }
}
