//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vframes_queue::{Delivery, DeliveryQueue};

use crate::config::WorkerConfig;
use crate::consumer::{AckDecision, MessageConsumer};
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Maximum messages read per queue call.
const MAX_BATCH: usize = 5;

/// Consumes deliveries from the queue and runs each in a bounded slot.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn DeliveryQueue>,
    consumer: MessageConsumer,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn DeliveryQueue>,
        consumer: MessageConsumer,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            consumer,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run until [`JobExecutor::shutdown`] is called, then wait for
    /// in-flight jobs up to the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            self.consumer.clone(),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they will be redelivered",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Read as many messages as there are free slots and start them.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(
                &self.consumer_name,
                self.config.consume_block.as_millis() as u64,
                available.min(MAX_BATCH),
            )
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} messages from queue", deliveries.len());

        for delivery in deliveries {
            Self::spawn_delivery(
                Arc::clone(&self.queue),
                self.consumer.clone(),
                Arc::clone(&self.job_semaphore),
                delivery,
            )
            .await?;
        }

        Ok(())
    }

    /// Periodically reclaim deliveries left unacknowledged by any consumer.
    async fn claim_loop(
        queue: Arc<dyn DeliveryQueue>,
        consumer: MessageConsumer,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        config: WorkerConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.claim_interval);
        let min_idle_ms = config.claim_min_idle.as_millis() as u64;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let outcome = match queue
                        .claim_stale(&consumer_name, min_idle_ms, config.claim_batch)
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!("Failed to claim stale deliveries: {}", e);
                            continue;
                        }
                    };

                    if outcome.dead_lettered > 0 {
                        warn!("Dead-lettered {} messages", outcome.dead_lettered);
                        metrics::record_dead_lettered(outcome.dead_lettered);
                    }
                    if !outcome.redelivered.is_empty() {
                        info!("Claimed {} stale deliveries", outcome.redelivered.len());
                    }

                    for delivery in outcome.redelivered {
                        let spawned = Self::spawn_delivery(
                            Arc::clone(&queue),
                            consumer.clone(),
                            Arc::clone(&semaphore),
                            delivery,
                        )
                        .await;
                        if spawned.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Wait for a free slot and run the delivery in it.
    async fn spawn_delivery(
        queue: Arc<dyn DeliveryQueue>,
        consumer: MessageConsumer,
        semaphore: Arc<Semaphore>,
        delivery: Delivery,
    ) -> WorkerResult<()> {
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::config("Job semaphore closed"))?;

        tokio::spawn(async move {
            let _permit = permit;
            Self::execute_delivery(queue.as_ref(), &consumer, delivery).await;
        });
        Ok(())
    }

    /// Handle one delivery and apply the decision to the queue.
    async fn execute_delivery(
        queue: &dyn DeliveryQueue,
        consumer: &MessageConsumer,
        delivery: Delivery,
    ) {
        let decision = consumer
            .handle(delivery.job.as_ref(), &delivery.message_id)
            .await;

        match decision {
            AckDecision::Acknowledge => {
                if let Err(e) = queue.ack(&delivery.message_id).await {
                    error!("Failed to ack message {}: {}", delivery.message_id, e);
                }
            }
            AckDecision::LeaveForRedelivery => {
                debug!(
                    "Leaving message {} pending for redelivery",
                    delivery.message_id
                );
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use vframes_models::{VideoJob, VideoJobMessage};
    use vframes_queue::{ClaimOutcome, NotificationTransport, QueueError, QueueResult};
    use vframes_storage::StorageError;

    use crate::notifier::NotificationPublisher;
    use crate::processor::VideoProcessing;

    #[derive(Default)]
    struct FakeQueue {
        init_fails: bool,
        batches: Mutex<VecDeque<Vec<Delivery>>>,
        claims: Mutex<VecDeque<ClaimOutcome>>,
        acked: Mutex<Vec<String>>,
        consumed: AtomicUsize,
        claim_calls: AtomicUsize,
    }

    impl FakeQueue {
        fn acked(&self) -> Vec<String> {
            let mut acked = self.acked.lock().unwrap().clone();
            acked.sort();
            acked
        }
    }

    #[async_trait]
    impl DeliveryQueue for FakeQueue {
        async fn init(&self) -> QueueResult<()> {
            if self.init_fails {
                let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                return Err(QueueError::Json(err));
            }
            Ok(())
        }

        async fn consume(
            &self,
            _consumer_name: &str,
            block_ms: u64,
            _count: usize,
        ) -> QueueResult<Vec<Delivery>> {
            let batch = self.batches.lock().unwrap().pop_front();
            match batch {
                Some(batch) => {
                    self.consumed.fetch_add(batch.len(), Ordering::SeqCst);
                    Ok(batch)
                }
                None => {
                    tokio::time::sleep(Duration::from_millis(block_ms)).await;
                    Ok(Vec::new())
                }
            }
        }

        async fn ack(&self, message_id: &str) -> QueueResult<()> {
            self.acked.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn claim_stale(
            &self,
            _consumer_name: &str,
            _min_idle_ms: u64,
            _count: usize,
        ) -> QueueResult<ClaimOutcome> {
            self.claim_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.claims.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    /// Fails with a storage timeout for inputs containing "timeout".
    struct ScriptedProcessor {
        delay: Duration,
    }

    #[async_trait]
    impl VideoProcessing for ScriptedProcessor {
        async fn process_video(&self, job: &VideoJob) -> WorkerResult<String> {
            tokio::time::sleep(self.delay).await;
            if job.input_path.contains("timeout") {
                return Err(StorageError::timeout(job.input_path.clone()).into());
            }
            Ok(job.input_path.replace("entrada", "saida"))
        }
    }

    struct SilentTransport;

    #[async_trait]
    impl NotificationTransport for SilentTransport {
        async fn publish(&self, _channel: &str, _payload: &str) -> QueueResult<()> {
            Ok(())
        }
    }

    fn consumer(delay: Duration) -> MessageConsumer {
        MessageConsumer::new(
            Arc::new(ScriptedProcessor { delay }),
            NotificationPublisher::new(Arc::new(SilentTransport), "vframes:notifications"),
        )
    }

    fn delivery(id: &str, input_path: Option<&str>) -> Delivery {
        Delivery {
            message_id: id.to_string(),
            job: input_path.map(|path| VideoJobMessage::new("22", "video.mp4", path)),
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            shutdown_timeout: Duration::from_secs(5),
            claim_interval: Duration::from_millis(20),
            consume_block: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_execute_delivery_applies_decision() {
        let queue = FakeQueue::default();
        let consumer = consumer(Duration::ZERO);

        JobExecutor::execute_delivery(&queue, &consumer, delivery("1-0", Some("entrada/ok.mp4")))
            .await;
        JobExecutor::execute_delivery(
            &queue,
            &consumer,
            delivery("2-0", Some("entrada/timeout.mp4")),
        )
        .await;
        JobExecutor::execute_delivery(&queue, &consumer, delivery("3-0", None)).await;

        assert_eq!(queue.acked(), vec!["1-0", "3-0"]);
    }

    #[tokio::test]
    async fn test_run_consumes_claims_and_stops() {
        let queue = Arc::new(FakeQueue::default());
        queue.batches.lock().unwrap().push_back(vec![
            delivery("1-0", Some("entrada/ok.mp4")),
            delivery("2-0", Some("entrada/timeout.mp4")),
        ]);
        queue.claims.lock().unwrap().push_back(ClaimOutcome {
            redelivered: vec![delivery("3-0", Some("entrada/retry.mp4"))],
            dead_lettered: 1,
        });

        let executor = Arc::new(JobExecutor::new(
            fast_config(),
            queue.clone(),
            consumer(Duration::ZERO),
        ));
        let runner = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.run().await }
        });

        wait_until(|| queue.acked() == vec!["1-0", "3-0"]).await;
        wait_until(|| queue.claim_calls.load(Ordering::SeqCst) >= 2).await;

        executor.shutdown();
        runner.await.unwrap().unwrap();
        assert_eq!(queue.acked(), vec!["1-0", "3-0"]);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_jobs() {
        let queue = Arc::new(FakeQueue::default());
        queue
            .batches
            .lock()
            .unwrap()
            .push_back(vec![delivery("1-0", Some("entrada/slow.mp4"))]);

        let executor = Arc::new(JobExecutor::new(
            fast_config(),
            queue.clone(),
            consumer(Duration::from_millis(200)),
        ));
        let runner = tokio::spawn({
            let executor = Arc::clone(&executor);
            async move { executor.run().await }
        });

        wait_until(|| queue.consumed.load(Ordering::SeqCst) == 1).await;
        executor.shutdown();
        runner.await.unwrap().unwrap();

        assert_eq!(queue.acked(), vec!["1-0"]);
    }

    #[tokio::test]
    async fn test_run_fails_when_queue_init_fails() {
        let queue = Arc::new(FakeQueue {
            init_fails: true,
            ..Default::default()
        });
        let executor = JobExecutor::new(fast_config(), queue.clone(), consumer(Duration::ZERO));

        let result = executor.run().await;

        assert!(matches!(result, Err(WorkerError::Queue(_))));
        assert_eq!(queue.consumed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_run_returns_promptly() {
        let executor = JobExecutor::new(
            fast_config(),
            Arc::new(FakeQueue::default()),
            consumer(Duration::ZERO),
        );
        executor.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), executor.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
