//! Storage layer for the shared ledger.
//!
//! This crate provides two storage abstractions:
//!
//! - [`EntryStore`]: the durable, append-only collection of ledger entries. It
//!   enforces nonce uniqueness and non-negative running balances at the storage
//!   layer, so the guarantees hold no matter how many writers race.
//! - [`KvStore`]: a volatile key-value store with TTLs, used for the balance
//!   cache and the rate-limit counters.
//!
//! # Backends
//!
//! | trait | backend | notes |
//! |---|---|---|
//! | `EntryStore` | [`RocksStore`] | `TransactionDB` with pessimistic key locks (feature `rocksdb-backend`) |
//! | `EntryStore` | [`PgStore`] | PostgreSQL, `UNIQUE(nonce)` and `CHECK (balance >= 0)` |
//! | `KvStore` | [`MemoryKv`] | single-process, for tests and single-node deployments |
//! | `KvStore` | [`RedisKv`] | shared across service replicas |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "rocksdb-backend")]
//! # async fn demo() -> shared_ledger_store::Result<()> {
//! use shared_ledger_core::{NewEntry, Nonce, OwnerId};
//! use shared_ledger_store::{EntryStore, RocksStore};
//!
//! let store = RocksStore::open("/tmp/shared-ledger-db")?;
//! let owner = OwnerId::new("u1").unwrap();
//!
//! store
//!     .insert_entry(NewEntry {
//!         operation: "CREDIT_ADD".into(),
//!         amount: 10,
//!         owner_id: owner.clone(),
//!         nonce: Nonce::new("n1").unwrap(),
//!     })
//!     .await?;
//!
//! assert_eq!(store.balance_of(&owner).await?, 10);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod kv;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{Result, StoreError};
pub use kv::{MemoryKv, RedisKv};
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use shared_ledger_core::{LedgerEntry, NewEntry, Nonce, OwnerId};

/// The entry store trait defining all ledger persistence operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB` embedded, PostgreSQL shared).
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Find the entry recorded under a nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_by_nonce(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>>;

    /// Sum of all entry amounts for an owner, 0 when there are none.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn balance_of(&self, owner_id: &OwnerId) -> Result<i64>;

    /// Commit a priced entry.
    ///
    /// The nonce check, the balance check and the write happen in one storage
    /// transaction that holds the owner's running total locked, so concurrent
    /// inserts for the same owner or the same nonce are serialized.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateNonce` if the nonce was already used.
    /// - `StoreError::InsufficientBalance` if the entry would make the balance negative.
    /// - `StoreError::Timeout` if a lock could not be acquired in time.
    async fn insert_entry(&self, entry: NewEntry) -> Result<LedgerEntry>;

    /// List entries for an owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_entries(
        &self,
        owner_id: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Release resources held by the store.
    async fn close(&self) {}
}

/// A volatile key-value store with per-key expiry.
///
/// Keys and values are strings. Implementations must make
/// [`incr_with_expiry`](KvStore::incr_with_expiry) a single atomic step.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` when absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Increment a counter and return the new count.
    ///
    /// When the increment creates the key, its expiry is set to `ttl`; later
    /// increments leave the expiry untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the value is not an integer.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Remaining time to live of a key, `None` when absent or without expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Release resources held by the client.
    async fn close(&self) {}
}
