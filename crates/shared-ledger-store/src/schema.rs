//! Database schema definitions and column families.
//!
//! This module defines the column families used by the `RocksDB` entry store and
//! the constraint names the PostgreSQL entry store relies on.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Committed entries, keyed by `entry_id` (big-endian).
    pub const ENTRIES: &str = "entries";

    /// Index: entry id by nonce, keyed by `nonce`.
    /// Locked for update on every insert; presence means the nonce is taken.
    pub const ENTRIES_BY_NONCE: &str = "entries_by_nonce";

    /// Index: entries by owner, keyed by `owner_id || 0x00 || entry_id`.
    /// Value is the entry amount, so balances can be summed from the index alone.
    pub const ENTRIES_BY_OWNER: &str = "entries_by_owner";

    /// Running balance per owner, keyed by `owner_id`.
    /// Locked for update on every insert to serialize writers per owner.
    pub const BALANCES: &str = "balances";
}

/// Constraint names in the PostgreSQL schema.
pub mod table {
    /// `UNIQUE (nonce)` on `ledger_entries`.
    pub const NONCE_CONSTRAINT: &str = "ledger_entries_nonce_key";

    /// `CHECK (balance >= 0)` on `ledger_balances`.
    pub const BALANCE_CONSTRAINT: &str = "ledger_balances_non_negative";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ENTRIES,
        cf::ENTRIES_BY_NONCE,
        cf::ENTRIES_BY_OWNER,
        cf::BALANCES,
    ]
}
