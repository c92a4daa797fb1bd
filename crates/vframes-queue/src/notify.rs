//! Outcome notifications via Redis Pub/Sub.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tracing::debug;

use crate::error::QueueResult;

/// Delivers serialized notifications to a named channel.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> QueueResult<()>;
}

/// Notification transport publishing with Redis `PUBLISH`.
pub struct RedisNotificationChannel {
    client: redis::Client,
}

impl RedisNotificationChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Subscribe to raw payloads published on `channel`.
    pub async fn subscribe(
        &self,
        channel: &str,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = String> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl NotificationTransport for RedisNotificationChannel {
    async fn publish(&self, channel: &str, payload: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        debug!("Publishing notification to {}", channel);
        let receivers: u64 = conn.publish(channel, payload).await?;
        debug!("Notification on {} reached {} subscribers", channel, receivers);

        Ok(())
    }
}
