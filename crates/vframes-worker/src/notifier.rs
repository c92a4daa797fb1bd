//! Outcome notification publishing.

use std::sync::Arc;

use tracing::{debug, warn};

use vframes_models::OutcomeNotification;
use vframes_queue::NotificationTransport;

use crate::metrics;

/// Publishes outcome notifications. Never fails: serialization and transport
/// errors are logged and counted.
#[derive(Clone)]
pub struct NotificationPublisher {
    transport: Arc<dyn NotificationTransport>,
    channel: String,
}

impl NotificationPublisher {
    pub fn new(transport: Arc<dyn NotificationTransport>, channel: impl Into<String>) -> Self {
        Self {
            transport,
            channel: channel.into(),
        }
    }

    pub async fn publish(&self, notification: &OutcomeNotification) {
        let payload = match serde_json::to_string(notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize notification for {}: {}", notification.video_name, e);
                metrics::record_notification_failure();
                return;
            }
        };

        match self.transport.publish(&self.channel, &payload).await {
            Ok(()) => debug!(
                "Published {} notification for {} to {}",
                notification.status.as_str(),
                notification.video_name,
                self.channel
            ),
            Err(e) => {
                warn!(
                    "Failed to publish notification for {} to {}: {}",
                    notification.video_name, self.channel, e
                );
                metrics::record_notification_failure();
            }
        }
    }
}
