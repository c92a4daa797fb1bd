//! Message handling and acknowledgement decisions.

use std::sync::Arc;

use tracing::Instrument;

use vframes_models::{OutcomeNotification, VideoJobMessage};

use crate::classify::{classify_chain, Cause, FailureClass};
use crate::logging::JobLogger;
use crate::metrics::{self, JobOutcome};
use crate::notifier::NotificationPublisher;
use crate::processor::VideoProcessing;

/// Operation name attached to job logs.
pub const OPERATION: &str = "video_frames";

/// What to do with a message once it has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Remove the message from the queue
    Acknowledge,
    /// Keep the message pending so that it is delivered again
    LeaveForRedelivery,
}

/// Validates a message, runs the pipeline, and decides its fate.
#[derive(Clone)]
pub struct MessageConsumer {
    processor: Arc<dyn VideoProcessing>,
    notifier: NotificationPublisher,
}

impl MessageConsumer {
    pub fn new(processor: Arc<dyn VideoProcessing>, notifier: NotificationPublisher) -> Self {
        Self {
            processor,
            notifier,
        }
    }

    /// Handle one delivery. `message` is `None` when the payload could not
    /// be parsed. Always yields exactly one decision.
    pub async fn handle(&self, message: Option<&VideoJobMessage>, message_id: &str) -> AckDecision {
        let logger = JobLogger::new(message_id, OPERATION);

        let job = match message.map(|m| m.validate()) {
            Some(Ok(job)) => job,
            Some(Err(e)) => {
                logger.log_warning(&format!("Discarding invalid job message: {}", e));
                metrics::record_job_outcome(JobOutcome::Malformed);
                return AckDecision::Acknowledge;
            }
            None => {
                logger.log_warning("Discarding message without a readable job payload");
                metrics::record_job_outcome(JobOutcome::Malformed);
                return AckDecision::Acknowledge;
            }
        };

        let span = logger.create_span();
        async {
            logger.log_start(&job.input_path);

            match self.processor.process_video(&job).await {
                Ok(output_key) => {
                    logger.log_completion(&output_key);
                    self.notifier
                        .publish(&OutcomeNotification::processed(&job, output_key))
                        .await;
                    metrics::record_job_outcome(JobOutcome::Processed);
                    AckDecision::Acknowledge
                }
                Err(e) => {
                    let causes = Cause::chain(&e);
                    let class = classify_chain(&causes);
                    metrics::record_job_outcome(class.into());

                    match class {
                        FailureClass::Transient => {
                            logger.log_warning(&format!(
                                "Transient failure, leaving for redelivery: {}",
                                e
                            ));
                            AckDecision::LeaveForRedelivery
                        }
                        FailureClass::Permanent => {
                            let root = causes.last().map(|c| c.message.as_str()).unwrap_or_default();
                            logger.log_error(&format!(
                                "Permanent failure, dropping message: {} (root cause: {})",
                                e, root
                            ));
                            AckDecision::Acknowledge
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
