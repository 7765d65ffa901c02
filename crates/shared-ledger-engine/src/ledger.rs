//! The ledger facade used by the HTTP layer.

use shared_ledger_core::{LedgerEntry, Nonce, OwnerId, Result};

use crate::cache::BalanceCache;
use crate::engine::LedgerEngine;
use crate::events::{EventSink, LedgerEvent};

/// Default page size for entry history.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest page of entry history served at once.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Engine plus balance cache.
///
/// Reads go through the cache. Writes go to the engine, and the owner's cached
/// balance is deleted before the write is acknowledged.
pub struct Ledger {
    engine: LedgerEngine,
    cache: BalanceCache,
}

impl Ledger {
    /// Combine an engine and a cache.
    #[must_use]
    pub const fn new(engine: LedgerEngine, cache: BalanceCache) -> Self {
        Self { engine, cache }
    }

    /// The underlying engine.
    #[must_use]
    pub const fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    /// Balance of an owner, from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the balance has to be recomputed and the store fails.
    pub async fn get_balance(&self, owner_id: &OwnerId) -> Result<i64> {
        let balance = self.cache.get_balance_cached(&self.engine, owner_id).await?;

        self.engine.events().emit(&LedgerEvent::BalanceQueried {
            owner_id: owner_id.clone(),
            balance,
        });

        Ok(balance)
    }

    /// Create an entry and invalidate the owner's cached balance.
    ///
    /// # Errors
    ///
    /// See [`LedgerEngine::create_entry`].
    pub async fn create_entry(
        &self,
        operation: &str,
        owner_id: &OwnerId,
        nonce: &Nonce,
    ) -> Result<LedgerEntry> {
        let entry = self.engine.create_entry(operation, owner_id, nonce).await?;
        self.cache.invalidate(owner_id).await;
        Ok(entry)
    }

    /// Entry history for an owner, newest first.
    ///
    /// `limit` is clamped to [`MAX_HISTORY_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store fails.
    pub async fn history(
        &self,
        owner_id: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        self.engine
            .list_entries(owner_id, limit.min(MAX_HISTORY_LIMIT), offset)
            .await
    }

    /// Close the entry store and the cache client.
    pub async fn close(&self) {
        self.engine.close().await;
        self.cache.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use shared_ledger_core::OperationCatalog;
    use shared_ledger_store::{KvStore, MemoryKv, RocksStore};
    use tempfile::TempDir;

    use crate::cache::DEFAULT_CACHE_TTL;
    use crate::events::CollectingSink;

    struct Fixture {
        ledger: Ledger,
        kv: Arc<MemoryKv>,
        sink: Arc<CollectingSink>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let kv = Arc::new(MemoryKv::new());
        let sink = Arc::new(CollectingSink::new());

        let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard())
            .with_events(sink.clone());
        let cache = BalanceCache::new(kv.clone(), DEFAULT_CACHE_TTL).with_events(sink.clone());

        Fixture {
            ledger: Ledger::new(engine, cache),
            kv,
            sink,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn write_invalidates_cached_balance() {
        let f = fixture();
        let owner = OwnerId::new("u1").unwrap();

        assert_eq!(f.ledger.get_balance(&owner).await.unwrap(), 0);
        assert_eq!(f.kv.get("balance:u1").await.unwrap().as_deref(), Some("0"));

        f.ledger
            .create_entry("CREDIT_ADD", &owner, &Nonce::new("n1").unwrap())
            .await
            .unwrap();
        assert!(f.kv.get("balance:u1").await.unwrap().is_none());

        assert_eq!(f.ledger.get_balance(&owner).await.unwrap(), 10);
        assert_eq!(f.sink.count("balance_queried"), 2);
    }

    #[tokio::test]
    async fn rejected_write_keeps_cache() {
        let f = fixture();
        let owner = OwnerId::new("u2").unwrap();

        f.ledger.get_balance(&owner).await.unwrap();
        f.ledger
            .create_entry("CREDIT_SPEND", &owner, &Nonce::new("n3").unwrap())
            .await
            .unwrap_err();

        assert_eq!(f.kv.get("balance:u2").await.unwrap().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let f = fixture();
        let owner = OwnerId::new("u1").unwrap();

        for (op, n) in [("CREDIT_ADD", "n1"), ("CREDIT_SPEND", "n2"), ("DAILY_REWARD", "n3")] {
            f.ledger
                .create_entry(op, &owner, &Nonce::new(n).unwrap())
                .await
                .unwrap();
        }

        let ops: Vec<_> = f
            .ledger
            .history(&owner, DEFAULT_HISTORY_LIMIT, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, vec!["DAILY_REWARD", "CREDIT_SPEND", "CREDIT_ADD"]);
    }
}
