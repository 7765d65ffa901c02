//! Shared Ledger Service - HTTP API for the shared ledger
//!
//! This is the main entry point for the shared-ledger service.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shared_ledger_service::{create_router, AppState, ServiceConfig};
use shared_ledger_store::{EntryStore, KvStore, MemoryKv, PgStore, RedisKv};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shared_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Shared Ledger Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        postgres = config.database_url.is_some(),
        redis = config.redis_url.is_some(),
        rate_limit_requests = config.rate_limit_requests,
        rate_limit_window_seconds = config.rate_limit_window_seconds,
        cache_ttl_seconds = config.cache_ttl_seconds,
        "Service configuration loaded"
    );

    let store = open_entry_store(&config).await?;
    let kv = open_kv_store(&config).await?;

    // Build app state
    let state = AppState::new(store, kv, config.clone())?;

    // Create the router
    let app = create_router(state.clone());

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.close().await;
    tracing::info!("Shared Ledger Service stopped");

    Ok(())
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise `RocksDB` under `DATA_DIR`.
async fn open_entry_store(
    config: &ServiceConfig,
) -> Result<Arc<dyn EntryStore>, Box<dyn std::error::Error>> {
    if let Some(url) = &config.database_url {
        tracing::info!(pool_size = config.database_pool_size, "Opening PostgreSQL store");
        let store = PgStore::connect(url, config.database_pool_size).await?;
        store.migrate().await?;
        return Ok(Arc::new(store));
    }

    #[cfg(feature = "rocksdb-backend")]
    {
        tracing::info!(path = %config.data_dir, "Opening RocksDB store");
        let store = shared_ledger_store::RocksStore::open(&config.data_dir)?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "rocksdb-backend"))]
    Err("DATABASE_URL is required when built without the rocksdb-backend feature".into())
}

/// Redis when `REDIS_URL` is set, otherwise process memory.
async fn open_kv_store(
    config: &ServiceConfig,
) -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis");
            Ok(Arc::new(RedisKv::connect(url).await?))
        }
        None => {
            tracing::warn!("REDIS_URL not set - cache and rate limits are local to this process");
            Ok(Arc::new(MemoryKv::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
