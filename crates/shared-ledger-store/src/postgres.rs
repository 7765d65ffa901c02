//! PostgreSQL storage implementation.
//!
//! Used when several service replicas share one ledger. The database enforces
//! both ledger invariants:
//!
//! | invariant | enforcement |
//! |---|---|
//! | one entry per nonce | `UNIQUE (nonce)` on `ledger_entries` |
//! | balance never negative | `CHECK (balance >= 0)` on `ledger_balances`, row locked with `FOR UPDATE` |
//!
//! ## Error mapping
//!
//! | SQLx error | `StoreError` |
//! |---|---|
//! | unique violation (`23505`) | `DuplicateNonce` |
//! | check violation (`23514`) | `InsufficientBalance` |
//! | `PoolTimedOut` | `Timeout` |
//! | `PoolClosed`, `Io` | `Unavailable` |
//! | anything else | `Database` |

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use shared_ledger_core::{EntryId, LedgerEntry, NewEntry, Nonce, OwnerId};

use crate::error::{Result, StoreError};
use crate::schema::table;
use crate::EntryStore;

/// PostgreSQL-backed entry store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` with at most `pool_size` connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        tracing::info!(pool_size, "Connected to PostgreSQL entry store");
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntryStore for PgStore {
    async fn find_by_nonce(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(
            r"
            SELECT id, operation, amount, nonce, owner_id, created_on
            FROM ledger_entries
            WHERE nonce = $1
            ",
        )
        .bind(nonce.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_nonce", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn balance_of(&self, owner_id: &OwnerId) -> Result<i64> {
        let row = sqlx::query(
            r"
            SELECT COALESCE(SUM(amount), 0)::BIGINT AS balance
            FROM ledger_entries
            WHERE owner_id = $1
            ",
        )
        .bind(owner_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("balance_of", e))?;

        row.try_get("balance")
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<LedgerEntry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_entry", e))?;

        let existing = sqlx::query("SELECT 1 FROM ledger_entries WHERE nonce = $1")
            .bind(entry.nonce.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_entry", e))?;
        if existing.is_some() {
            return Err(StoreError::DuplicateNonce {
                nonce: entry.nonce.to_string(),
            });
        }

        sqlx::query(
            r"
            INSERT INTO ledger_balances (owner_id, balance)
            VALUES ($1, 0)
            ON CONFLICT (owner_id) DO NOTHING
            ",
        )
        .bind(entry.owner_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;

        let balance: i64 = sqlx::query(
            "SELECT balance FROM ledger_balances WHERE owner_id = $1 FOR UPDATE",
        )
        .bind(entry.owner_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?
        .try_get("balance")
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let new_balance = balance
            .checked_add(entry.amount)
            .ok_or_else(|| StoreError::Database("balance overflow".into()))?;
        if new_balance < 0 {
            return Err(StoreError::InsufficientBalance {
                balance,
                amount: entry.amount,
            });
        }

        let row = sqlx::query(
            r"
            INSERT INTO ledger_entries (operation, amount, nonce, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, operation, amount, nonce, owner_id, created_on
            ",
        )
        .bind(&entry.operation)
        .bind(entry.amount)
        .bind(entry.nonce.as_str())
        .bind(entry.owner_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(&entry, balance, e))?;

        sqlx::query("UPDATE ledger_balances SET balance = $2 WHERE owner_id = $1")
            .bind(entry.owner_id.as_str())
            .bind(new_balance)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(&entry, balance, e))?;

        tx.commit()
            .await
            .map_err(|e| map_insert_error(&entry, balance, e))?;

        entry_from_row(&row)
    }

    async fn list_entries(
        &self,
        owner_id: &OwnerId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r"
            SELECT id, operation, amount, nonce, owner_id, created_on
            FROM ledger_entries
            WHERE owner_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(owner_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entries", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let decode = |e: sqlx::Error| StoreError::Serialization(e.to_string());

    let owner: String = row.try_get("owner_id").map_err(decode)?;
    let nonce: String = row.try_get("nonce").map_err(decode)?;

    Ok(LedgerEntry {
        id: EntryId::new(row.try_get("id").map_err(decode)?),
        operation: row.try_get("operation").map_err(decode)?,
        amount: row.try_get("amount").map_err(decode)?,
        owner_id: OwnerId::new(owner).map_err(|e| StoreError::Serialization(e.to_string()))?,
        nonce: Nonce::new(nonce).map_err(|e| StoreError::Serialization(e.to_string()))?,
        created_on: row.try_get("created_on").map_err(decode)?,
    })
}

/// Constraint violations on the write path carry the entry's context.
fn map_insert_error(entry: &NewEntry, balance: i64, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let constraint = db_err.constraint();
        if db_err.is_unique_violation() && constraint.map_or(true, |c| c == table::NONCE_CONSTRAINT)
        {
            return StoreError::DuplicateNonce {
                nonce: entry.nonce.to_string(),
            };
        }
        if db_err.is_check_violation()
            && constraint.map_or(true, |c| c == table::BALANCE_CONSTRAINT)
        {
            return StoreError::InsufficientBalance {
                balance,
                amount: entry.amount,
            };
        }
    }
    map_sqlx_error("insert_entry", err)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("database error in {operation}: {}", db_err.message()))
        }
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}
