//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::classify::FailureClass;
use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "vframes_jobs_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "vframes_jobs_dead_lettered_total";
    pub const NOTIFICATION_FAILURES_TOTAL: &str = "vframes_notification_failures_total";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "vframes_download_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "vframes_upload_duration_seconds";
}

/// Outcome label of a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Processed,
    Malformed,
    Transient,
    Permanent,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Processed => "processed",
            JobOutcome::Malformed => "malformed",
            JobOutcome::Transient => "transient",
            JobOutcome::Permanent => "permanent",
        }
    }
}

impl From<FailureClass> for JobOutcome {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Transient => JobOutcome::Transient,
            FailureClass::Permanent => JobOutcome::Permanent,
        }
    }
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
/// Must be called from within the tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config(format!("Failed to install Prometheus exporter: {}", e)))
}

/// Record a handled message.
pub fn record_job_outcome(outcome: JobOutcome) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

/// Record messages moved to the dead letter stream.
pub fn record_dead_lettered(count: usize) {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(count as u64);
}

/// Record a notification that could not be published.
pub fn record_notification_failure() {
    counter!(names::NOTIFICATION_FAILURES_TOTAL).increment(1);
}

/// Record download duration.
pub fn record_download_duration(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

/// Record upload duration.
pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}
