//! Chunkflow gateway - HTTP ingress for job creation and status

use anyhow::{Context, Result};
use chunkflow_common::logging::{init_logging, LogConfig};
use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chunkflow_server::{
    api::health::health_routes,
    app::build_router,
    bus::{amqp, amqp::AmqpPublisher, retry::RetryPolicy},
    cache::{redis::RedisCache, ProgressTracker},
    config::Config,
    db::{self, jobs::PgJobRepository},
    features::JobsState,
    signal::shutdown_signal,
    storage::S3Storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env_for("chunkflow-server")?
        .with_default_directives("chunkflow_server=debug,tower_http=debug,sqlx=warn,lapin=info");
    let _log_guard = init_logging(&log_config)?;

    info!("Starting chunkflow gateway");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database).await?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database migrations completed");

    let storage = S3Storage::new(config.storage.clone());
    info!(bucket = %storage.bucket(), "Storage client initialized");

    let cache = RedisCache::connect(&config.redis.url).await?;
    cache.ping().await?;

    let connection = amqp::connect(&config.amqp.url).await?;
    let publisher = AmqpPublisher::new(&connection, config.amqp.exchange.clone()).await?;

    let shutdown = CancellationToken::new();

    let state = JobsState {
        jobs: Arc::new(PgJobRepository::new(pool.clone())),
        storage: Arc::new(storage),
        progress: ProgressTracker::new(
            Arc::new(cache),
            config.redis.status_ttl(),
            config.redis.progress_ttl(),
        ),
        publisher: Arc::new(publisher),
        job_created_routing_key: config.amqp.job_created_routing_key.clone(),
        retry: RetryPolicy::default(),
        shutdown: shutdown.clone(),
    };

    let app = build_router(state, &config, health_routes().with_state(pool.clone()))?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .into_future();

    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    let drain_deadline = async {
        shutdown.cancelled().await;
        info!("Waiting up to {} seconds for connections to close", drain_timeout.as_secs());
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => warn!("Connections still open after drain timeout, exiting"),
    }

    if let Err(e) = connection.close(200, "shutdown").await {
        warn!(error = %e, "Failed to close AMQP connection cleanly");
    }
    pool.close().await;

    info!("Server shut down gracefully");

    Ok(())
}
