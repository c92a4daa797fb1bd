//! Job queue using Redis Streams.

use std::collections::HashMap;

use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply};
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vframes_models::VideoJobMessage;

use crate::error::{QueueError, QueueResult};

/// Stream entry field holding the JSON job payload.
pub const JOB_FIELD: &str = "job";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Deliveries allowed before a message is dead-lettered
    pub max_deliveries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vframes:jobs".to_string(),
            consumer_group: "vframes:workers".to_string(),
            dlq_stream_name: "vframes:dlq".to_string(),
            max_deliveries: 5,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or(defaults.dlq_stream_name),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_deliveries),
        }
    }
}

/// One message handed to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Stream entry ID, used to acknowledge
    pub message_id: String,
    /// Parsed job, `None` when the payload is missing or not a job
    pub job: Option<VideoJobMessage>,
}

impl Delivery {
    fn from_entry(entry: &StreamId) -> Self {
        Self {
            message_id: entry.id.clone(),
            job: parse_job_payload(&entry.id, &entry.map),
        }
    }
}

/// Result of a stale-delivery sweep.
#[derive(Debug, Default)]
pub struct ClaimOutcome {
    /// Deliveries claimed by this consumer for another attempt
    pub redelivered: Vec<Delivery>,
    /// Messages moved to the dead letter stream
    pub dead_lettered: usize,
}

/// Queue operations a worker needs to run deliveries.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Prepare the stream and consumer group.
    async fn init(&self) -> QueueResult<()>;

    /// Read new messages for `consumer_name`.
    async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Remove a handled message.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Reclaim or dead-letter deliveries left unacknowledged.
    async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<ClaimOutcome>;
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a job message.
    pub async fn enqueue(&self, message: &VideoJobMessage) -> QueueResult<String> {
        let payload = serde_json::to_string(message)?;
        self.enqueue_raw(&payload).await
    }

    /// Enqueue a raw payload as-is.
    pub async fn enqueue_raw(&self, payload: &str) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(JOB_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        debug!("Enqueued message {}", message_id);
        Ok(message_id)
    }

    /// Acknowledge a message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new messages for `consumer_name`, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let deliveries: Vec<Delivery> = result
            .map(|reply| {
                reply
                    .keys
                    .iter()
                    .flat_map(|key| key.ids.iter())
                    .map(Delivery::from_entry)
                    .collect()
            })
            .unwrap_or_default();

        if !deliveries.is_empty() {
            debug!("Consumed {} messages from stream", deliveries.len());
        }
        Ok(deliveries)
    }

    /// Sweep deliveries left unacknowledged for at least `min_idle_ms`.
    ///
    /// Messages already delivered `max_deliveries` times go to the dead
    /// letter stream; the rest are claimed by `consumer_name` and returned
    /// for another attempt.
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<ClaimOutcome> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut outcome = ClaimOutcome::default();
        let mut to_claim = Vec::new();

        for entry in &pending.ids {
            if entry.times_delivered as u64 >= u64::from(self.config.max_deliveries) {
                self.dead_letter(&mut conn, &entry.id, entry.times_delivered).await?;
                outcome.dead_lettered += 1;
            } else {
                to_claim.push(entry.id.clone());
            }
        }

        if !to_claim.is_empty() {
            let claimed: StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .arg(consumer_name)
                .arg(min_idle_ms)
                .arg(&to_claim)
                .query_async(&mut conn)
                .await?;

            outcome.redelivered = claimed.ids.iter().map(Delivery::from_entry).collect();
            for delivery in &outcome.redelivered {
                info!("Claimed stale message {} for redelivery", delivery.message_id);
            }
        }

        Ok(outcome)
    }

    /// Copy a message to the dead letter stream and acknowledge it.
    async fn dead_letter(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        message_id: &str,
        deliveries: usize,
    ) -> QueueResult<()> {
        let range: StreamRangeReply = conn
            .xrange(&self.config.stream_name, message_id, message_id)
            .await?;

        if let Some(payload) = range.ids.first().and_then(|e| payload_bytes(&e.map)) {
            redis::cmd("XADD")
                .arg(&self.config.dlq_stream_name)
                .arg("*")
                .arg(JOB_FIELD)
                .arg(payload)
                .arg("original_id")
                .arg(message_id)
                .arg("deliveries")
                .arg(deliveries)
                .query_async::<()>(&mut *conn)
                .await?;
        }

        self.ack(message_id).await?;
        warn!(
            "Moved message {} to DLQ after {} deliveries",
            message_id, deliveries
        );
        Ok(())
    }
}

#[async_trait]
impl DeliveryQueue for JobQueue {
    async fn init(&self) -> QueueResult<()> {
        JobQueue::init(self).await
    }

    async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        JobQueue::consume(self, consumer_name, block_ms, count).await
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        JobQueue::ack(self, message_id).await
    }

    async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<ClaimOutcome> {
        JobQueue::claim_stale(self, consumer_name, min_idle_ms, count).await
    }
}

fn payload_bytes(map: &HashMap<String, redis::Value>) -> Option<&[u8]> {
    match map.get(JOB_FIELD)? {
        redis::Value::BulkString(bytes) => Some(bytes.as_slice()),
        redis::Value::SimpleString(s) => Some(s.as_bytes()),
        _ => None,
    }
}

/// Parse the job field of a stream entry. Missing or unparseable payloads
/// yield `None`.
fn parse_job_payload(message_id: &str, map: &HashMap<String, redis::Value>) -> Option<VideoJobMessage> {
    let Some(payload) = payload_bytes(map) else {
        warn!("Message {} has no job payload", message_id);
        return None;
    };

    match serde_json::from_slice::<VideoJobMessage>(payload) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("Failed to parse job payload of {}: {}", message_id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: redis::Value) -> HashMap<String, redis::Value> {
        HashMap::from([(JOB_FIELD.to_string(), payload)])
    }

    #[test]
    fn test_parse_valid_payload() {
        let map = entry(redis::Value::BulkString(
            br#"{"idUsuario":"22","nomeVideo":"v.mp4","caminhoVideo":"entrada/22/v.mp4"}"#.to_vec(),
        ));

        let job = parse_job_payload("1-0", &map).unwrap();
        assert_eq!(job.user_id.as_deref(), Some("22"));
        assert_eq!(job.input_path.as_deref(), Some("entrada/22/v.mp4"));
    }

    #[test]
    fn test_parse_malformed_payloads() {
        let not_json = entry(redis::Value::BulkString(b"not json".to_vec()));
        assert!(parse_job_payload("1-0", &not_json).is_none());

        let wrong_shape = entry(redis::Value::SimpleString("[1,2,3]".to_string()));
        assert!(parse_job_payload("1-0", &wrong_shape).is_none());

        let wrong_type = entry(redis::Value::Int(7));
        assert!(parse_job_payload("1-0", &wrong_type).is_none());

        assert!(parse_job_payload("1-0", &HashMap::new()).is_none());
    }

    #[test]
    fn test_missing_fields_still_parse() {
        let map = entry(redis::Value::BulkString(br#"{"nomeVideo":"v.mp4"}"#.to_vec()));
        let job = parse_job_payload("1-0", &map).unwrap();
        assert!(job.user_id.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "vframes:jobs");
        assert_eq!(config.consumer_group, "vframes:workers");
        assert_eq!(config.dlq_stream_name, "vframes:dlq");
        assert_eq!(config.max_deliveries, 5);
    }
}
