//! The ledger accounting engine.
//!
//! `create_entry` runs, in order:
//!
//! 1. nonce lookup, a hit is `DuplicateTransaction`
//! 2. catalog resolution, a miss is `InvalidOperation`
//! 3. balance guard for negative amounts, `InsufficientBalance`
//! 4. commit through the entry store
//!
//! Steps 1 and 3 are fast paths. The store re-checks both inside its write
//! transaction, and its rejections are translated to the same errors, so racing
//! writers see the same outcome as sequential ones.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shared_ledger_core::{
    LedgerEntry, LedgerError, NewEntry, Nonce, OperationCatalog, OwnerId, Result,
};
use shared_ledger_store::{EntryStore, StoreError};

use crate::events::{EventSink, LedgerEvent, TracingSink};

/// Default limit for a single entry store call.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Prices and commits ledger entries.
pub struct LedgerEngine {
    store: Arc<dyn EntryStore>,
    catalog: OperationCatalog,
    storage_timeout: Duration,
    events: Arc<dyn EventSink>,
}

impl LedgerEngine {
    /// Create an engine over a store with a validated catalog.
    #[must_use]
    pub fn new(store: Arc<dyn EntryStore>, catalog: OperationCatalog) -> Self {
        Self {
            store,
            catalog,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            events: Arc::new(TracingSink),
        }
    }

    /// Bound every entry store call.
    #[must_use]
    pub const fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Route events to `events` instead of `tracing`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The catalog this engine prices with.
    #[must_use]
    pub const fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub(crate) fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Current balance of an owner, recomputed from the entry store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store fails or does not answer in time.
    pub async fn get_balance(&self, owner_id: &OwnerId) -> Result<i64> {
        self.timed("balance_of", self.store.balance_of(owner_id))
            .await?
            .map_err(|e| storage_error("balance_of", e))
    }

    /// Price and commit an entry.
    ///
    /// The amount always comes from the catalog.
    ///
    /// # Errors
    ///
    /// - `LedgerError::DuplicateTransaction` if the nonce was already used.
    /// - `LedgerError::InvalidOperation` if the operation is not in the catalog.
    /// - `LedgerError::InsufficientBalance` if the entry would make the balance negative.
    /// - `LedgerError::StorageUnavailable` / `StorageTimeout` on store failure.
    pub async fn create_entry(
        &self,
        operation: &str,
        owner_id: &OwnerId,
        nonce: &Nonce,
    ) -> Result<LedgerEntry> {
        match self.try_create_entry(operation, owner_id, nonce).await {
            Ok(entry) => {
                self.events.emit(&LedgerEvent::EntryCreated {
                    entry_id: entry.id,
                    owner_id: entry.owner_id.clone(),
                    nonce: entry.nonce.clone(),
                    operation: entry.operation.clone(),
                    amount: entry.amount,
                });
                Ok(entry)
            }
            Err(err) if err.is_transient() => {
                tracing::error!(
                    error = %err,
                    owner_id = %owner_id,
                    nonce = %nonce,
                    operation,
                    "Ledger write failed"
                );
                Err(err)
            }
            Err(err) => {
                self.events.emit(&LedgerEvent::ValidationFailed {
                    kind: err.kind(),
                    owner_id: owner_id.clone(),
                    nonce: nonce.clone(),
                    operation: operation.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn try_create_entry(
        &self,
        operation: &str,
        owner_id: &OwnerId,
        nonce: &Nonce,
    ) -> Result<LedgerEntry> {
        let existing = self
            .timed("find_by_nonce", self.store.find_by_nonce(nonce))
            .await?
            .map_err(|e| storage_error("find_by_nonce", e))?;
        if existing.is_some() {
            return Err(LedgerError::DuplicateTransaction {
                nonce: nonce.to_string(),
            });
        }

        let amount =
            self.catalog
                .resolve(operation)
                .ok_or_else(|| LedgerError::InvalidOperation {
                    operation: operation.to_string(),
                })?;

        if amount < 0 {
            let balance = self.get_balance(owner_id).await?;
            if balance.checked_add(amount).map_or(true, |next| next < 0) {
                return Err(LedgerError::InsufficientBalance {
                    owner_id: owner_id.to_string(),
                    balance,
                    amount,
                });
            }
        }

        let entry = NewEntry {
            operation: operation.to_string(),
            amount,
            owner_id: owner_id.clone(),
            nonce: nonce.clone(),
        };

        self.timed("insert_entry", self.store.insert_entry(entry))
            .await?
            .map_err(|e| match e {
                StoreError::DuplicateNonce { nonce } => LedgerError::DuplicateTransaction { nonce },
                StoreError::InsufficientBalance { balance, amount } => {
                    LedgerError::InsufficientBalance {
                        owner_id: owner_id.to_string(),
                        balance,
                        amount,
                    }
                }
                other => storage_error("insert_entry", other),
            })
    }

    /// Entries for an owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store fails or does not answer in time.
    pub async fn list_entries(
        &self,
        owner_id: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        self.timed(
            "list_entries",
            self.store.list_entries(owner_id, limit, offset),
        )
        .await?
        .map_err(|e| storage_error("list_entries", e))
    }

    /// Close the entry store.
    pub async fn close(&self) {
        self.store.close().await;
    }

    async fn timed<T, F>(&self, operation: &'static str, call: F) -> Result<F::Output>
    where
        F: Future<Output = shared_ledger_store::Result<T>>,
    {
        tokio::time::timeout(self.storage_timeout, call)
            .await
            .map_err(|_| LedgerError::StorageTimeout {
                operation,
                after: self.storage_timeout,
            })
    }
}

fn storage_error(operation: &str, err: StoreError) -> LedgerError {
    LedgerError::StorageUnavailable(format!("{operation}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_ledger_store::RocksStore;
    use tempfile::TempDir;

    use crate::events::CollectingSink;

    fn create_engine() -> (LedgerEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (
            LedgerEngine::new(Arc::new(store), OperationCatalog::standard()),
            dir,
        )
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id).unwrap()
    }

    fn nonce(id: &str) -> Nonce {
        Nonce::new(id).unwrap()
    }

    #[tokio::test]
    async fn credit_then_spend() {
        let (engine, _dir) = create_engine();

        let credit = engine
            .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
            .await
            .unwrap();
        assert_eq!(credit.amount, 10);

        let spend = engine
            .create_entry("CREDIT_SPEND", &owner("u1"), &nonce("n2"))
            .await
            .unwrap();
        assert_eq!(spend.amount, -1);
        assert!(spend.id > credit.id);

        assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn duplicate_checked_before_operation() {
        let (engine, _dir) = create_engine();
        engine
            .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
            .await
            .unwrap();

        let err = engine
            .create_entry("NOT_AN_OPERATION", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::DuplicateTransaction {
                nonce: "n1".into()
            }
        );
    }

    #[tokio::test]
    async fn unknown_operation_rejected() {
        let (engine, _dir) = create_engine();

        let err = engine
            .create_entry("CONTENT_CREATION", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidOperation {
                operation: "CONTENT_CREATION".into()
            }
        );
    }

    #[tokio::test]
    async fn zero_amount_skips_balance_guard() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let catalog = OperationCatalog::extended([("CONTENT_ACCESS", 0)]).unwrap();
        let engine = LedgerEngine::new(Arc::new(store), catalog);

        let entry = engine
            .create_entry("CONTENT_ACCESS", &owner("fresh"), &nonce("n1"))
            .await
            .unwrap();
        assert_eq!(entry.amount, 0);
        assert_eq!(engine.get_balance(&owner("fresh")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn events_report_outcomes() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let sink = Arc::new(CollectingSink::new());
        let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard())
            .with_events(sink.clone());

        engine
            .create_entry("CREDIT_SPEND", &owner("u2"), &nonce("n3"))
            .await
            .unwrap_err();
        engine
            .create_entry("SIGNUP_CREDIT", &owner("u2"), &nonce("n4"))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            LedgerEvent::ValidationFailed { kind, .. }
                if *kind == shared_ledger_core::FailureKind::InsufficientBalance
        ));
        assert!(matches!(
            &events[1],
            LedgerEvent::EntryCreated { amount: 3, .. }
        ));
    }

    /// Store that never sees the nonce or the balance, so only its own
    /// transaction can reject the write.
    struct RacingStore {
        reject: fn() -> StoreError,
    }

    #[async_trait]
    impl EntryStore for RacingStore {
        async fn find_by_nonce(
            &self,
            _nonce: &Nonce,
        ) -> shared_ledger_store::Result<Option<LedgerEntry>> {
            Ok(None)
        }

        async fn balance_of(&self, _owner_id: &OwnerId) -> shared_ledger_store::Result<i64> {
            Ok(100)
        }

        async fn insert_entry(
            &self,
            _entry: NewEntry,
        ) -> shared_ledger_store::Result<LedgerEntry> {
            Err((self.reject)())
        }

        async fn list_entries(
            &self,
            _owner_id: &OwnerId,
            _limit: usize,
            _offset: usize,
        ) -> shared_ledger_store::Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn store_level_nonce_conflict_is_duplicate() {
        let store = RacingStore {
            reject: || StoreError::DuplicateNonce {
                nonce: "n1".into(),
            },
        };
        let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard());

        let err = engine
            .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTransaction { .. }));
    }

    #[tokio::test]
    async fn store_level_overdraw_is_insufficient_balance() {
        let store = RacingStore {
            reject: || StoreError::InsufficientBalance {
                balance: 0,
                amount: -1,
            },
        };
        let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard());

        let err = engine
            .create_entry("CREDIT_SPEND", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                owner_id: "u1".into(),
                balance: 0,
                amount: -1,
            }
        );
    }

    #[tokio::test]
    async fn store_outage_is_transient() {
        let store = RacingStore {
            reject: || StoreError::Unavailable("connection refused".into()),
        };
        let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard());

        let err = engine
            .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, LedgerError::StorageUnavailable(_)));
    }

    struct StalledStore;

    #[async_trait]
    impl EntryStore for StalledStore {
        async fn find_by_nonce(
            &self,
            _nonce: &Nonce,
        ) -> shared_ledger_store::Result<Option<LedgerEntry>> {
            std::future::pending().await
        }

        async fn balance_of(&self, _owner_id: &OwnerId) -> shared_ledger_store::Result<i64> {
            std::future::pending().await
        }

        async fn insert_entry(
            &self,
            _entry: NewEntry,
        ) -> shared_ledger_store::Result<LedgerEntry> {
            std::future::pending().await
        }

        async fn list_entries(
            &self,
            _owner_id: &OwnerId,
            _limit: usize,
            _offset: usize,
        ) -> shared_ledger_store::Result<Vec<LedgerEntry>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out() {
        let engine = LedgerEngine::new(Arc::new(StalledStore), OperationCatalog::standard())
            .with_storage_timeout(Duration::from_millis(250));

        let err = engine.get_balance(&owner("u1")).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::StorageTimeout {
                operation: "balance_of",
                after: Duration::from_millis(250),
            }
        );

        let err = engine
            .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::StorageTimeout {
                operation: "find_by_nonce",
                ..
            }
        ));
    }

    /// Waits on a blocking thread before writing, like a contended row lock.
    struct LockWaitStore {
        rocks: RocksStore,
        wait: Duration,
    }

    #[async_trait]
    impl EntryStore for LockWaitStore {
        async fn find_by_nonce(
            &self,
            nonce: &Nonce,
        ) -> shared_ledger_store::Result<Option<LedgerEntry>> {
            self.rocks.find_by_nonce(nonce).await
        }

        async fn balance_of(&self, owner_id: &OwnerId) -> shared_ledger_store::Result<i64> {
            self.rocks.balance_of(owner_id).await
        }

        async fn insert_entry(&self, entry: NewEntry) -> shared_ledger_store::Result<LedgerEntry> {
            let wait = self.wait;
            tokio::task::spawn_blocking(move || std::thread::sleep(wait))
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            self.rocks.insert_entry(entry).await
        }

        async fn list_entries(
            &self,
            owner_id: &OwnerId,
            limit: usize,
            offset: usize,
        ) -> shared_ledger_store::Result<Vec<LedgerEntry>> {
            self.rocks.list_entries(owner_id, limit, offset).await
        }
    }

    #[tokio::test]
    async fn blocked_write_surfaces_as_timeout() {
        let dir = TempDir::new().unwrap();
        let store = LockWaitStore {
            rocks: RocksStore::open(dir.path()).unwrap(),
            wait: Duration::from_secs(2),
        };
        let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard())
            .with_storage_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = engine
            .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(err.is_transient());
        assert_eq!(
            err,
            LedgerError::StorageTimeout {
                operation: "insert_entry",
                after: Duration::from_millis(100),
            }
        );
    }
}
