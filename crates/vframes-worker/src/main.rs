//! Video frame archiving worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vframes_media::FfmpegDecoder;
use vframes_queue::{JobQueue, RedisNotificationChannel};
use vframes_storage::S3BlobStore;
use vframes_worker::{
    metrics, JobExecutor, MessageConsumer, NotificationPublisher, VideoProcessor, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS connections to Redis)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting vframes-worker");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::install_exporter(addr)?;
        info!("Prometheus metrics listening on {}", addr);
    }

    tokio::fs::create_dir_all(&config.work_dir).await?;

    let store = Arc::new(S3BlobStore::from_env().await?);
    let processor = VideoProcessor::new(
        store,
        Arc::new(FfmpegDecoder::new()),
        config.output_rule.clone(),
        config.work_dir.clone(),
    );

    let queue_config = vframes_queue::QueueConfig::from_env();
    let notifier = NotificationPublisher::new(
        Arc::new(RedisNotificationChannel::new(&queue_config.redis_url)?),
        config.notify_channel.clone(),
    );
    let consumer = MessageConsumer::new(Arc::new(processor), notifier);
    let queue = Arc::new(JobQueue::new(queue_config)?);

    let executor = Arc::new(JobExecutor::new(config, queue, consumer));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        return Err(e.into());
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vframes=info".parse()?)
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
