//! Survey Monkey webhook service.
//!
//! Main entry point. Loads configuration, connects the delivery store,
//! starts the handler workers and serves the webhook endpoint until a
//! shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use surveyhook_api::{shutdown_signal, start_server, AppState, Config};
use surveyhook_core::{storage::Storage, MulticastNotifier, Notification, NotificationHandler};
use surveyhook_dispatch::{
    storage::PostgresDeliveryStore, DispatchRouter, HandlerRegistry, ProcessingPipeline,
    WorkerPool,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        jobs = config.jobs.len(),
        keyed_secrets = config.signing_secrets.len(),
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    let storage = Arc::new(Storage::new(pool));
    storage.delivery_records.ensure_schema().await.context("failed to create delivery schema")?;
    info!("delivery store ready");

    let mut workers = WorkerPool::new(config.to_worker_config());
    workers.spawn_workers();

    let mut notifier = MulticastNotifier::new();
    notifier.subscribe(Arc::new(NotificationLogger));

    let registry = HandlerRegistry::with_builtin_jobs();
    info!(handlers = ?registry.names(), "handler registry loaded");

    let router =
        DispatchRouter::new(Arc::new(registry), Arc::new(notifier), Arc::new(workers.queue()))
            .with_event_type_key(config.event_type_key.clone());
    let pipeline = ProcessingPipeline::new(
        Arc::new(PostgresDeliveryStore::new(storage.clone())),
        router,
        Arc::new(config.jobs.clone()),
    )
    .with_name(config.webhook_name.clone());

    let addr = config.parse_server_addr()?;
    let state = AppState::new(pipeline, Arc::new(config));

    let served = start_server(state, addr, shutdown_signal()).await;

    if let Err(e) = workers.shutdown_graceful().await {
        error!(error = %e, "handler workers did not stop cleanly");
    }

    storage.delivery_records.pool().close().await;
    info!("database connections closed");

    served.context("HTTP server failed")?;
    info!("shutdown complete");
    Ok(())
}

/// Logs every published notification.
#[derive(Debug)]
struct NotificationLogger;

#[async_trait::async_trait]
impl NotificationHandler for NotificationLogger {
    async fn handle_notification(&self, notification: Notification) {
        info!(
            notification = %notification.name,
            delivery_id = %notification.record.id,
            "webhook notification published"
        );
    }
}

/// Initializes tracing, preferring `RUST_LOG` over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Creates the database connection pool, retrying while the database
/// comes up.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;

                info!("database connection pool established");
                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}
