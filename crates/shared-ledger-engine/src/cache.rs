//! Read-through balance cache.
//!
//! Values live under `balance:{owner_id}` with a TTL. A successful write for an
//! owner deletes the key; it is never overwritten with a computed value. Any
//! key-value store failure falls back to the engine.

use std::sync::Arc;
use std::time::Duration;

use shared_ledger_core::{OwnerId, Result};
use shared_ledger_store::{keys, KvStore};

use crate::engine::LedgerEngine;
use crate::events::{EventSink, LedgerEvent, TracingSink};

/// Default lifetime of a cached balance.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(360);

/// Caches owner balances in a key-value store.
pub struct BalanceCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    events: Arc<dyn EventSink>,
}

impl BalanceCache {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            kv,
            ttl,
            events: Arc::new(TracingSink),
        }
    }

    /// Route hit/miss events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Cache key for an owner.
    #[must_use]
    pub fn key(owner_id: &OwnerId) -> String {
        keys::balance_cache_key(owner_id)
    }

    /// Cached balance, or the engine's balance on a miss.
    ///
    /// # Errors
    ///
    /// Only engine failures are returned; cache failures are logged.
    pub async fn get_balance_cached(
        &self,
        engine: &LedgerEngine,
        owner_id: &OwnerId,
    ) -> Result<i64> {
        let key = Self::key(owner_id);

        match self.kv.get(&key).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(balance) => {
                    self.events.emit(&LedgerEvent::CacheHit {
                        owner_id: owner_id.clone(),
                    });
                    return Ok(balance);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding malformed cached balance");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Balance cache read failed");
            }
        }

        self.events.emit(&LedgerEvent::CacheMiss {
            owner_id: owner_id.clone(),
        });

        let balance = engine.get_balance(owner_id).await?;

        if let Err(e) = self
            .kv
            .set_with_ttl(&key, &balance.to_string(), self.ttl)
            .await
        {
            tracing::warn!(key = %key, error = %e, "Balance cache write failed");
        }

        Ok(balance)
    }

    /// Drop the cached balance for an owner.
    pub async fn invalidate(&self, owner_id: &OwnerId) {
        let key = Self::key(owner_id);
        if let Err(e) = self.kv.delete(&key).await {
            tracing::warn!(
                key = %key,
                error = %e,
                "Balance cache invalidation failed, value expires with its TTL"
            );
        }
    }

    /// Close the key-value client.
    pub async fn close(&self) {
        self.kv.close().await;
    }
}
