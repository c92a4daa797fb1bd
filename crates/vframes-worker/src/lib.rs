//! Video frame archiving worker.
//!
//! This crate provides:
//! - The job pipeline (download, frame extraction, packaging, upload)
//! - Message validation, failure classification and ack decisions
//! - Outcome notifications
//! - A queue executor with bounded concurrency and graceful shutdown

pub mod classify;
pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod notifier;
pub mod processor;

pub use classify::{classify, classify_chain, Cause, CauseTag, FailureClass};
pub use config::WorkerConfig;
pub use consumer::{AckDecision, MessageConsumer};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use notifier::NotificationPublisher;
pub use processor::{VideoProcessing, VideoProcessor, ARCHIVE_CONTENT_TYPE};
