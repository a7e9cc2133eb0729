//! Chunkflow chunker - consumes job-created events and produces chunks

use anyhow::Result;
use chunkflow_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chunkflow_server::{
    bus::{
        amqp::{self, AmqpPublisher},
        consumer::{ChunkerConsumer, DeliveryPolicy},
    },
    cache::{redis::RedisCache, ProgressTracker},
    chunker::ChunkerUseCase,
    config::Config,
    db::{self, jobs::PgJobRepository},
    signal::shutdown_signal,
    storage::S3Storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env_for("chunkflow-chunker")?
        .with_default_directives("chunkflow_server=debug,sqlx=warn,lapin=info");
    let _log_guard = init_logging(&log_config)?;

    info!("Starting chunkflow chunker");

    let config = Config::load()?;
    info!(
        chunk_size = config.chunker.chunk_size,
        queue = %config.amqp.job_created_queue,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database).await?;
    let storage = S3Storage::new(config.storage.clone());
    let cache = RedisCache::connect(&config.redis.url).await?;

    let connection = amqp::connect(&config.amqp.url).await?;
    let publisher = AmqpPublisher::new(&connection, config.amqp.exchange.clone()).await?;

    let use_case = ChunkerUseCase::new(
        Arc::new(PgJobRepository::new(pool.clone())),
        Arc::new(storage),
        Arc::new(publisher),
        ProgressTracker::new(
            Arc::new(cache),
            config.redis.status_ttl(),
            config.redis.progress_ttl(),
        ),
        config.amqp.chunk_ready_routing_key.clone(),
        config.chunker.chunk_size,
    );

    let consumer = ChunkerConsumer::new(
        &connection,
        &config.amqp,
        Arc::new(use_case),
        DeliveryPolicy {
            drop_permanent_failures: config.chunker.drop_permanent_failures,
        },
        config.shutdown_grace(),
    )
    .await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    consumer.run(shutdown).await?;

    if let Err(e) = connection.close(200, "shutdown").await {
        warn!(error = %e, "Failed to close AMQP connection cleanly");
    }
    pool.close().await;

    info!("Chunker shut down");

    Ok(())
}
