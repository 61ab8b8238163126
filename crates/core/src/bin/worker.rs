//! Worker process entrypoint.
//!
//! Wires the `Kernel` from environment configuration and runs the `Worker`
//! service until SIGINT/SIGTERM: masked env logging, `dotenvy`, a single
//! pool, one `Arc`-wrapped dependency container.

use anyhow::{Context, Result};
use async_trait::async_trait;
use connectors::credentials::EnvSecretSource;
use connectors::registry::{ConnectorRegistry, RegistryConfig};
use connectors::{adapters, AccountRef, ConnectorError, PlatformAdapter, SessionManager};
use leasebot_core::pipeline::stores_postgres::PostgresStores;
use leasebot_core::queue::PostgresQueueAdapter;
use leasebot_core::showing_postgres::PostgresBookingStore;
use leasebot_core::config::log_masked_env;
use leasebot_core::{service, Config, Kernel, Worker};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Session refresh for the listing sites is an out-of-process RPA concern;
/// this logs the request so an external driver watching the logs can act
/// on it.
struct LoggingSessionManager;

#[async_trait]
impl SessionManager for LoggingSessionManager {
    async fn refresh(&self, account: &AccountRef, reason: &str) -> Result<(), ConnectorError> {
        tracing::warn!(
            account_id = %account.account_id,
            platform = account.platform.as_str(),
            reason,
            "session refresh requested, delegating to external RPA runtime"
        );
        Ok(())
    }
}

fn all_adapters() -> Vec<Arc<dyn PlatformAdapter>> {
    vec![
        Arc::new(adapters::spareroom::SpareroomAdapter::new()),
        Arc::new(adapters::roomies::RoomiesAdapter::new()),
        Arc::new(adapters::renthop::RenthopAdapter::new()),
        Arc::new(adapters::leasebreak::LeasebreakAdapter::new()),
        Arc::new(adapters::furnishedfinder::FurnishedfinderAdapter::new()),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leasebot_core=debug,connectors=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    tracing::info!("starting leasebot worker");

    dotenvy::dotenv().ok();
    tracing::info!("environment variables:");
    for name in &[
        "DATABASE_URL",
        "WORKER_POLL_INTERVAL_MS",
        "WORKER_CLAIM_TTL_MS",
        "WORKER_QUEUE_BATCH_SIZE",
        "WORKER_INSTANCE_ID",
        "PLATFORM_DEFAULT_SEND_MODE",
        "LEASE_BOT_RPA_RUNTIME",
    ] {
        log_masked_env(name);
    }

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    let config = Config::from_env().context("failed to load configuration")?;

    let queue = Arc::new(PostgresQueueAdapter::new(pool.clone()));
    let connectors = Arc::new(ConnectorRegistry::new(
        all_adapters(),
        Arc::new(LoggingSessionManager),
        Arc::new(EnvSecretSource),
        RegistryConfig::default(),
    ));
    let stores = Arc::new(PostgresStores::new(pool.clone()));
    let bookings = Arc::new(PostgresBookingStore::new(pool.clone()));

    // No AI classifier implementation is wired up here; `classify` falls
    // back to rule-based intent matching since the AI step is pluggable,
    // not required.
    let kernel = Arc::new(Kernel::new(
        config,
        queue,
        connectors,
        None,
        stores.clone(),
        stores.clone(),
        stores,
        bookings,
    ));

    service::run_with_signal_shutdown(Box::new(Worker::new(kernel))).await
}
