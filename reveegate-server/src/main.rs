//! ReveeGate Server
//!
//! Donation gateway for live streamers: payment provider webhooks in,
//! real-time donation alerts out.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url, get_redis_url};
use deadpool_redis::Runtime;
use reveegate_core::framework::DatabaseProcessor;
use reveegate_core::processors::DistributionBridge;
use reveegate_core::store::{PgDonationStore, RedisBroker, RedisIdempotencyStore};
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// ReveeGate - donation payments and live alerts
#[derive(Parser, Debug)]
#[command(name = "reveegate-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./reveegate-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting reveegate-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    let listen_addr = config.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;
    let redis_url = get_redis_url().map_err(|e| {
        tracing::error!("REDIS_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let redis_pool = deadpool_redis::Config::from_url(redis_url.as_str())
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| {
            tracing::error!("Failed to create Redis pool: {}", e);
            e
        })?;
    let redis_client = deadpool_redis::redis::Client::open(redis_url.as_str()).map_err(|e| {
        tracing::error!("Invalid REDIS_URL: {}", e);
        e
    })?;

    let store = Arc::new(PgDonationStore::new(DatabaseProcessor::new(db_pool.clone())));
    let idempotency = Arc::new(RedisIdempotencyStore::new(redis_pool.clone()));
    let broker = Arc::new(RedisBroker::new(redis_pool, redis_client));

    let (state, hub) = AppState::new(&config, store, idempotency, broker.clone());
    let hub_handle = state.hub.clone();
    let hub_task = tokio::spawn(hub.run());
    let bridge_task = tokio::spawn(DistributionBridge::new(broker, hub_handle.clone()).run());

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    tracing::info!("Stopping realtime feed...");
    hub_handle.stop();
    if let Err(e) = bridge_task.await {
        tracing::error!("Distribution bridge task failed: {}", e);
    }
    match hub_task.await {
        Ok(detached) => {
            tracing::info!(connections = detached.len(), "Connection hub stopped");
        }
        Err(e) => tracing::error!("Connection hub task failed: {}", e),
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
