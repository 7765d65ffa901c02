//! Operation catalog.
//!
//! The catalog maps an operation name to the fixed signed amount it moves a
//! balance by. Entry amounts are always priced from here, never from the caller.
//!
//! Different apps sharing the ledger may define their own operations, but every
//! catalog must contain the [`SHARED_OPERATIONS`] baseline. This is checked once,
//! when the catalog is built; a catalog cannot change afterwards.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CatalogError;

// ============================================================================
// Shared Operations
// ============================================================================

/// Daily reward credit.
pub const DAILY_REWARD: &str = "DAILY_REWARD";

/// One-time signup credit.
pub const SIGNUP_CREDIT: &str = "SIGNUP_CREDIT";

/// Generic spend.
pub const CREDIT_SPEND: &str = "CREDIT_SPEND";

/// Generic top-up.
pub const CREDIT_ADD: &str = "CREDIT_ADD";

/// Operation names every catalog must define.
pub const SHARED_OPERATIONS: [&str; 4] = [DAILY_REWARD, SIGNUP_CREDIT, CREDIT_SPEND, CREDIT_ADD];

/// An immutable mapping from operation name to signed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OperationCatalog {
    amounts: BTreeMap<String, i64>,
}

impl OperationCatalog {
    /// Build a catalog from name/amount pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MissingSharedOperations`] if any shared operation
    /// is absent, or [`CatalogError::EmptyOperationName`] for a blank name.
    pub fn new<I, S>(operations: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let amounts: BTreeMap<String, i64> = operations
            .into_iter()
            .map(|(name, amount)| (name.into(), amount))
            .collect();

        if amounts.keys().any(|name| name.trim().is_empty()) {
            return Err(CatalogError::EmptyOperationName);
        }
        Self::validate(&amounts)?;

        Ok(Self { amounts })
    }

    /// The baseline catalog with only the shared operations.
    #[must_use]
    pub fn standard() -> Self {
        let amounts = [
            (DAILY_REWARD, 1),
            (SIGNUP_CREDIT, 3),
            (CREDIT_SPEND, -1),
            (CREDIT_ADD, 10),
        ]
        .into_iter()
        .map(|(name, amount)| (name.to_string(), amount))
        .collect();

        Self { amounts }
    }

    /// The baseline catalog with app-specific operations layered on top.
    ///
    /// An extra operation with a shared name overrides the baseline amount.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyOperationName`] for a blank name.
    pub fn extended<I, S>(extra: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut amounts = Self::standard().amounts;
        amounts.extend(extra.into_iter().map(|(name, amount)| (name.into(), amount)));
        Self::new(amounts)
    }

    /// Check that a set of operations contains every shared operation.
    ///
    /// # Errors
    ///
    /// Returns the missing names, sorted, in [`CatalogError::MissingSharedOperations`].
    pub fn validate(amounts: &BTreeMap<String, i64>) -> Result<(), CatalogError> {
        let mut missing: Vec<String> = SHARED_OPERATIONS
            .iter()
            .filter(|name| !amounts.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort();
            Err(CatalogError::MissingSharedOperations { missing })
        }
    }

    /// Look up the amount for an operation.
    #[must_use]
    pub fn resolve(&self, operation: &str) -> Option<i64> {
        self.amounts.get(operation).copied()
    }

    /// Whether the catalog defines an operation.
    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.amounts.contains_key(operation)
    }

    /// Iterate over operations in name order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, i64)> {
        self.amounts.iter().map(|(name, amount)| (name.as_str(), *amount))
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    /// Always false for a validated catalog; provided for completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}

impl Default for OperationCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
