//! Ledger entry types.
//!
//! Entries are append-only. Once committed an entry is never updated or removed;
//! balances are derived by summing them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, Nonce, OwnerId};

/// A committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned identifier.
    pub id: EntryId,

    /// Catalog operation that priced this entry.
    pub operation: String,

    /// Signed amount. Positive = credit, Negative = debit.
    pub amount: i64,

    /// The owner whose balance this entry moves.
    pub owner_id: OwnerId,

    /// Idempotency token, unique across the whole ledger.
    pub nonce: Nonce,

    /// When the store committed the entry.
    pub created_on: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether this entry adds to the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        self.amount > 0
    }

    /// Whether this entry removes from the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// A priced entry waiting to be committed.
///
/// Built by the accounting engine after catalog resolution; the store assigns
/// `id` and `created_on` when it commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Catalog operation name.
    pub operation: String,

    /// Amount resolved from the catalog.
    pub amount: i64,

    /// Owner whose balance moves.
    pub owner_id: OwnerId,

    /// Idempotency token.
    pub nonce: Nonce,
}

impl NewEntry {
    /// Attach the store-assigned fields.
    #[must_use]
    pub fn commit(self, id: EntryId, created_on: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            operation: self.operation,
            amount: self.amount,
            owner_id: self.owner_id,
            nonce: self.nonce,
            created_on,
        }
    }
}

/// An owner's current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    /// The owner.
    pub owner_id: OwnerId,

    /// Sum of all entry amounts for the owner.
    pub balance: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(amount: i64) -> NewEntry {
        NewEntry {
            operation: "CREDIT_ADD".into(),
            amount,
            owner_id: OwnerId::new("u1").unwrap(),
            nonce: Nonce::new("n1").unwrap(),
        }
    }

    #[test]
    fn commit_keeps_priced_fields() {
        let now = Utc::now();
        let entry = new_entry(10).commit(EntryId::new(7), now);

        assert_eq!(entry.id, EntryId::new(7));
        assert_eq!(entry.amount, 10);
        assert_eq!(entry.owner_id.as_str(), "u1");
        assert_eq!(entry.nonce.as_str(), "n1");
        assert_eq!(entry.created_on, now);
        assert!(entry.is_credit());
    }

    #[test]
    fn debit_entry() {
        let entry = new_entry(-1).commit(EntryId::new(1), Utc::now());
        assert!(entry.is_debit());
        assert!(!entry.is_credit());
    }

    #[test]
    fn balance_json_shape() {
        let balance = LedgerBalance {
            owner_id: OwnerId::new("u1").unwrap(),
            balance: 9,
        };
        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json, serde_json::json!({ "owner_id": "u1", "balance": 9 }));
    }
}
