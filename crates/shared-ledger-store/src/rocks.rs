//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `EntryStore` trait.
//!
//! Writes go through a pessimistic `TransactionDB`. Every insert takes exclusive
//! locks on the nonce index key and on the owner's running-balance key before
//! checking them, so two writers with the same nonce, or two writers for the
//! same owner, are serialized by `RocksDB` itself. Lock order is always nonce,
//! then balance, so writers cannot deadlock.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, MultiThreaded,
    Options, TransactionDB, TransactionDBOptions,
};

use shared_ledger_core::{EntryId, LedgerEntry, NewEntry, Nonce, OwnerId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::EntryStore;

/// How long a writer waits for a contended key lock, in milliseconds.
const DEFAULT_LOCK_TIMEOUT_MS: i64 = 2_000;

/// RocksDB-backed entry store.
///
/// `RocksDB` calls block, including lock waits, so every trait method runs its
/// body on the blocking thread pool and the returned future stays cancellable.
#[derive(Clone)]
pub struct RocksStore {
    inner: Arc<Inner>,
}

struct Inner {
    db: TransactionDB<MultiThreaded>,
    next_id: AtomicI64,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT_MS)
    }

    /// Open with a custom lock wait timeout in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_lock_timeout<P: AsRef<Path>>(path: P, lock_timeout_ms: i64) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(lock_timeout_ms);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db: TransactionDB<MultiThreaded> =
            TransactionDB::open_cf_descriptors(&opts, &txn_db_opts, path, cf_descriptors)
                .map_err(map_rocks_error)?;

        let inner = Inner {
            db,
            next_id: AtomicI64::new(0),
        };
        let last_id = inner.last_entry_id()?;
        inner.next_id.store(last_id + 1, Ordering::SeqCst);
        tracing::debug!(last_id, "Opened RocksDB entry store");

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Run `op` against the database on the blocking thread pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Unavailable(format!("storage task failed: {e}")))?
    }
}

impl Inner {
    /// Highest committed entry id, 0 for an empty store.
    fn last_entry_id(&self) -> Result<i64> {
        let cf = self.cf(cf::ENTRIES)?;

        let last = self.db.iterator_cf(&cf, IteratorMode::End).next();
        match last {
            Some(item) => {
                let (key, _) = item.map_err(map_rocks_error)?;
                let bytes = <[u8; 8]>::try_from(&key[..])
                    .map_err(|_| StoreError::Serialization("malformed entry key".into()))?;
                Ok(EntryId::from_be_bytes(bytes).get())
            }
            None => Ok(0),
        }
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::ENTRIES)?;

        self.db
            .get_cf(&cf, keys::entry_key(id))
            .map_err(map_rocks_error)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn find_by_nonce(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::ENTRIES_BY_NONCE)?;

        let Some(id_bytes) = self
            .db
            .get_cf(&cf, keys::nonce_key(nonce))
            .map_err(map_rocks_error)?
        else {
            return Ok(None);
        };

        let bytes: [u8; 8] = id_bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed nonce index value".into()))?;

        self.get_entry(EntryId::from_be_bytes(bytes))
    }

    /// Keys of the owner index for one owner, oldest first.
    fn owner_index(&self, owner_id: &OwnerId) -> Result<Vec<(Vec<u8>, i64)>> {
        let cf = self.cf(cf::ENTRIES_BY_OWNER)?;
        let prefix = keys::owner_entries_prefix(owner_id);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(map_rocks_error)?;

            if !key.starts_with(&prefix) {
                break;
            }

            let amount = keys::decode_i64(&value)
                .ok_or_else(|| StoreError::Serialization("malformed amount in owner index".into()))?;
            rows.push((key.to_vec(), amount));
        }

        Ok(rows)
    }

    fn balance_of(&self, owner_id: &OwnerId) -> Result<i64> {
        self.owner_index(owner_id)?
            .into_iter()
            .try_fold(0_i64, |sum, (_, amount)| sum.checked_add(amount))
            .ok_or_else(|| StoreError::Database("balance overflow".into()))
    }

    fn insert_entry(&self, entry: NewEntry) -> Result<LedgerEntry> {
        let cf_entries = self.cf(cf::ENTRIES)?;
        let cf_nonce = self.cf(cf::ENTRIES_BY_NONCE)?;
        let cf_owner = self.cf(cf::ENTRIES_BY_OWNER)?;
        let cf_balances = self.cf(cf::BALANCES)?;

        let nonce_key = keys::nonce_key(&entry.nonce);
        let balance_key = keys::balance_key(&entry.owner_id);

        // Dropping the transaction without commit rolls it back.
        let txn = self.db.transaction();

        if txn
            .get_for_update_cf(&cf_nonce, &nonce_key, true)
            .map_err(map_rocks_error)?
            .is_some()
        {
            return Err(StoreError::DuplicateNonce {
                nonce: entry.nonce.to_string(),
            });
        }

        let balance = txn
            .get_for_update_cf(&cf_balances, &balance_key, true)
            .map_err(map_rocks_error)?
            .map(|data| {
                keys::decode_i64(&data)
                    .ok_or_else(|| StoreError::Serialization("malformed running balance".into()))
            })
            .transpose()?
            .unwrap_or(0);

        let new_balance = balance
            .checked_add(entry.amount)
            .ok_or_else(|| StoreError::Database("balance overflow".into()))?;
        if new_balance < 0 {
            return Err(StoreError::InsufficientBalance {
                balance,
                amount: entry.amount,
            });
        }

        let id = EntryId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let committed = entry.commit(id, chrono::Utc::now());
        let value = Self::serialize(&committed)?;
        let entry_key = keys::entry_key(id);

        txn.put_cf(&cf_entries, &entry_key, &value)
            .map_err(map_rocks_error)?;
        txn.put_cf(&cf_nonce, &nonce_key, &entry_key)
            .map_err(map_rocks_error)?;
        txn.put_cf(
            &cf_owner,
            keys::owner_entry_key(&committed.owner_id, id),
            keys::encode_i64(committed.amount),
        )
        .map_err(map_rocks_error)?;
        txn.put_cf(&cf_balances, &balance_key, keys::encode_i64(new_balance))
            .map_err(map_rocks_error)?;

        txn.commit().map_err(map_rocks_error)?;

        Ok(committed)
    }

    fn list_entries(
        &self,
        owner_id: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let mut index = self.owner_index(owner_id)?;

        // Reverse to get newest first
        index.reverse();

        let mut entries = Vec::with_capacity(limit.min(index.len()));
        for (key, _) in index.into_iter().skip(offset).take(limit) {
            let id = keys::extract_entry_id_from_owner_key(&key)
                .ok_or_else(|| StoreError::Serialization("malformed owner index key".into()))?;
            if let Some(entry) = self.get_entry(id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl EntryStore for RocksStore {
    async fn find_by_nonce(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>> {
        let nonce = nonce.clone();
        self.blocking(move |inner| inner.find_by_nonce(&nonce)).await
    }

    async fn balance_of(&self, owner_id: &OwnerId) -> Result<i64> {
        let owner_id = owner_id.clone();
        self.blocking(move |inner| inner.balance_of(&owner_id)).await
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<LedgerEntry> {
        self.blocking(move |inner| inner.insert_entry(entry)).await
    }

    async fn list_entries(
        &self,
        owner_id: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let owner_id = owner_id.clone();
        self.blocking(move |inner| inner.list_entries(&owner_id, limit, offset))
            .await
    }

    async fn close(&self) {
        // The WAL is synced on drop; nothing else is buffered.
        tracing::debug!("Closing RocksDB entry store");
    }
}

/// Map a `RocksDB` error, treating lock contention as a timeout.
fn map_rocks_error(err: rocksdb::Error) -> StoreError {
    match err.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            StoreError::Timeout(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}
