//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vframes_models::OutputKeyRule;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for ephemeral job files
    pub work_dir: PathBuf,
    /// How often the worker sweeps for stale deliveries
    pub claim_interval: Duration,
    /// Minimum idle time before an unacknowledged delivery is reclaimed
    pub claim_min_idle: Duration,
    /// Maximum deliveries reclaimed per sweep
    pub claim_batch: usize,
    /// How long a queue read blocks waiting for messages
    pub consume_block: Duration,
    /// Pub/Sub channel for outcome notifications
    pub notify_channel: String,
    /// Mapping from source keys to archive keys
    pub output_rule: OutputKeyRule,
    /// Prometheus listener address, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/vframes"),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            claim_batch: 5,
            consume_block: Duration::from_millis(1000),
            notify_channel: "vframes:notifications".to_string(),
            output_rule: OutputKeyRule::default(),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            parsed(&lookup, key).map(Duration::from_secs).unwrap_or(default)
        };

        let max_concurrent_jobs =
            parsed(&lookup, "WORKER_MAX_JOBS").unwrap_or(defaults.max_concurrent_jobs);
        if max_concurrent_jobs == 0 {
            return Err(WorkerError::config("WORKER_MAX_JOBS must be at least 1"));
        }

        let metrics_addr = match lookup("METRICS_ADDR").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse().map_err(|e| {
                WorkerError::config(format!("METRICS_ADDR '{}' is not a socket address: {}", raw, e))
            })?),
            None => None,
        };

        let claim_interval = secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval);
        if claim_interval.is_zero() {
            return Err(WorkerError::config("WORKER_CLAIM_INTERVAL_SECS must be at least 1"));
        }
        let claim_min_idle = secs("WORKER_CLAIM_MIN_IDLE_SECS", defaults.claim_min_idle);
        if claim_min_idle.is_zero() {
            return Err(WorkerError::config("WORKER_CLAIM_MIN_IDLE_SECS must be at least 1"));
        }
        let claim_batch = parsed(&lookup, "WORKER_CLAIM_BATCH").unwrap_or(defaults.claim_batch);
        if claim_batch == 0 {
            return Err(WorkerError::config("WORKER_CLAIM_BATCH must be at least 1"));
        }

        let base_rule = defaults.output_rule;
        let output_rule = OutputKeyRule::new(
            lookup("OUTPUT_INPUT_SEGMENT").unwrap_or(base_rule.input_segment),
            lookup("OUTPUT_OUTPUT_SEGMENT").unwrap_or(base_rule.output_segment),
            lookup("OUTPUT_ARCHIVE_EXTENSION").unwrap_or(base_rule.archive_extension),
        );

        Ok(Self {
            max_concurrent_jobs,
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            work_dir: lookup("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            claim_interval,
            claim_min_idle,
            claim_batch,
            consume_block: parsed(&lookup, "WORKER_CONSUME_BLOCK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.consume_block),
            notify_channel: lookup("NOTIFY_CHANNEL").unwrap_or(defaults.notify_channel),
            output_rule,
            metrics_addr,
        })
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}
