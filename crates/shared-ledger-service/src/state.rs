//! Application state.

use std::sync::Arc;

use jsonwebtoken::DecodingKey;

use shared_ledger_core::OperationCatalog;
use shared_ledger_engine::{BalanceCache, Ledger, LedgerEngine, RateLimiter};
use shared_ledger_store::{EntryStore, KvStore};

use crate::config::{ConfigError, ServiceConfig};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine plus balance cache.
    pub ledger: Arc<Ledger>,

    /// Per-client request counter.
    pub limiter: Arc<RateLimiter>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Bearer token key, absent when no secret is configured.
    pub jwt_key: Option<DecodingKey>,
}

impl AppState {
    /// Wire the ledger components over the given stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured operations do not form a valid catalog.
    pub fn new(
        store: Arc<dyn EntryStore>,
        kv: Arc<dyn KvStore>,
        config: ServiceConfig,
    ) -> Result<Self, ConfigError> {
        let catalog = OperationCatalog::extended(config.operations.clone())?;
        tracing::info!(
            operations = catalog.len(),
            "Operation catalog loaded"
        );

        let engine = LedgerEngine::new(store, catalog).with_storage_timeout(config.storage_timeout());
        let cache = BalanceCache::new(Arc::clone(&kv), config.cache_ttl());
        let limiter = RateLimiter::new(kv, config.rate_limit());

        let jwt_key = config
            .jwt_secret
            .as_ref()
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()));
        if jwt_key.is_none() {
            tracing::warn!("JWT_SECRET_KEY not set - all authenticated requests will be rejected");
        }

        Ok(Self {
            ledger: Arc::new(Ledger::new(engine, cache)),
            limiter: Arc::new(limiter),
            config,
            jwt_key,
        })
    }

    /// Close the entry store and the key-value client.
    pub async fn close(&self) {
        self.ledger.close().await;
        tracing::info!("Ledger stores closed");
    }
}
