//! Vote Ingester Binary
//!
//! Streams public messages filtered by the active poll options and
//! publishes one vote per matched option to NSQ.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin vote-ingester
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `SP_TWITTER_KEY`: consumer key
//! - `SP_TWITTER_SECRET`: consumer secret
//! - `SP_TWITTER_ACCESSTOKEN`: access token
//! - `SP_TWITTER_ACCESSSECRET`: access token secret
//!
//! ## Optional
//! - `VOTES_MONGO_URL`: poll storage (default: mongodb://localhost)
//! - `VOTES_MONGO_DATABASE` / `VOTES_MONGO_COLLECTION`: (default: ballots / polls)
//! - `VOTES_NSQD_ADDR`: nsqd TCP address (default: localhost:4150)
//! - `VOTES_NSQ_TOPIC`: vote topic (default: votes)
//! - `VOTES_STREAM_ENDPOINT`: filtered stream endpoint
//! - `VOTES_DIAL_TIMEOUT_SECS`: connect timeout (default: 5)
//! - `VOTES_RETRY_STRATEGY`: fixed | exponential (default: fixed)
//! - `VOTES_RETRY_DELAY_SECS`: delay between sessions (default: 10)
//! - `VOTES_RETRY_MAX_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `VOTES_WATCHDOG_INTERVAL_SECS`: connection watchdog period (default: 60)
//! - `VOTES_PUBLISH_MAX_ATTEMPTS`: attempts per vote (default: 3)
//! - `VOTES_PUBLISH_RETRY_DELAY_MS`: pause between attempts (default: 250)
//! - `VOTES_METRICS_PORT`: Prometheus port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use vote_ingester::application::services::{
    Pipeline, PublishPolicy, ReconnectSupervisor, ShutdownCoordinator, StopFlag, VotePublisher,
};
use vote_ingester::infrastructure::config::IngesterConfig;
use vote_ingester::infrastructure::metrics;
use vote_ingester::infrastructure::mongo::MongoOptionSource;
use vote_ingester::infrastructure::nsq::NsqProducer;
use vote_ingester::infrastructure::stream::{ConnectionManager, StreamAuthenticator, StreamReader};
use vote_ingester::infrastructure::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting vote ingester");

    let config = match IngesterConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    log_config(&config);

    if config.metrics_port != 0 {
        match metrics::init_metrics(config.metrics_port) {
            Ok(addr) => tracing::info!(addr = %addr, "Metrics listener started"),
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    let options = match MongoOptionSource::connect(&config.mongo).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            return Err(e).context("poll storage unavailable");
        }
    };

    let connections = Arc::new(ConnectionManager::new());
    let reader = StreamReader::new(
        config.stream.endpoint.clone(),
        StreamAuthenticator::new(config.credentials.clone()),
        config.stream.dial_timeout,
    )
    .context("failed to build stream client")?;

    let stop = StopFlag::new();
    let supervisor = ReconnectSupervisor::new(
        Arc::new(options.clone()),
        Arc::new(reader),
        Arc::clone(&connections),
        config.retry.build(),
        stop.clone(),
    );
    let publisher = VotePublisher::new(
        Box::new(NsqProducer::new(config.queue.nsqd_addr.clone())),
        config.queue.topic.clone(),
        PublishPolicy {
            max_attempts: config.queue.publish_max_attempts,
            retry_delay: config.queue.publish_retry_delay,
        },
    );
    let coordinator =
        ShutdownCoordinator::new(stop, connections, config.shutdown.watchdog_interval);

    let report = Pipeline::new(supervisor, publisher, coordinator)
        .run(await_shutdown())
        .await;

    options.close().await;

    tracing::info!(
        published = report.publisher.published,
        dropped = report.publisher.dropped,
        "Vote ingester stopped"
    );
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngesterConfig) {
    tracing::info!(
        endpoint = %config.stream.endpoint,
        nsqd = %config.queue.nsqd_addr,
        topic = %config.queue.topic,
        database = %config.mongo.database,
        collection = %config.mongo.collection,
        retry_strategy = config.retry.strategy.as_str(),
        retry_delay_secs = config.retry.delay.as_secs(),
        watchdog_secs = config.shutdown.watchdog_interval.as_secs(),
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
