//! Error types for the shared ledger.

use std::time::Duration;

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
///
/// The first four variants are business-rule failures: they are final for the
/// request and never retried by the ledger. The storage variants are transient
/// and safe for a caller to retry, since a failed write leaves no partial state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// An entry with this nonce already exists.
    #[error("transaction with nonce '{nonce}' already exists")]
    DuplicateTransaction {
        /// The replayed nonce.
        nonce: String,
    },

    /// The operation is not in the catalog.
    #[error("invalid operation: {operation}")]
    InvalidOperation {
        /// The unknown operation name.
        operation: String,
    },

    /// The entry would leave the owner with a negative balance.
    #[error(
        "insufficient balance: current balance {balance} with operation amount {amount} \
         would result in a negative balance"
    )]
    InsufficientBalance {
        /// The owner being charged.
        owner_id: String,
        /// Balance before the entry.
        balance: i64,
        /// Signed amount of the rejected entry.
        amount: i64,
    },

    /// Too many requests for one client and endpoint in the current window.
    #[error("rate limit exceeded for {key}")]
    RateLimitExceeded {
        /// The counter key that tripped.
        key: String,
        /// Time until the window resets, when known.
        retry_after: Option<Duration>,
    },

    /// The backing store failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A storage call did not finish in time.
    #[error("storage timeout during {operation} after {after:?}")]
    StorageTimeout {
        /// The engine step that timed out.
        operation: &'static str,
        /// The configured limit.
        after: Duration,
    },

    /// A caller-supplied identifier is malformed.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Whether a caller may retry the request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::StorageUnavailable(_) | Self::StorageTimeout { .. }
        )
    }

    /// Classify the failure for reporting.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::DuplicateTransaction { .. } => FailureKind::DuplicateTransaction,
            Self::InvalidOperation { .. } | Self::InvalidId(_) => FailureKind::InvalidOperation,
            Self::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            Self::RateLimitExceeded { .. } => FailureKind::RateLimited,
            Self::StorageUnavailable(_) | Self::StorageTimeout { .. } => FailureKind::Storage,
        }
    }
}

/// Coarse failure classification used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Nonce replay.
    DuplicateTransaction,
    /// Unknown operation or malformed input.
    InvalidOperation,
    /// Balance guard tripped.
    InsufficientBalance,
    /// Throttled.
    RateLimited,
    /// Store unavailable or slow.
    Storage,
}

impl FailureKind {
    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateTransaction => "duplicate_transaction",
            Self::InvalidOperation => "invalid_operation",
            Self::InsufficientBalance => "insufficient_balance",
            Self::RateLimited => "rate_limited",
            Self::Storage => "storage",
        }
    }
}

/// Errors raised while building an [`OperationCatalog`](crate::OperationCatalog).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// One or more shared operations are absent.
    #[error("missing required shared operations: {}", .missing.join(", "))]
    MissingSharedOperations {
        /// The absent names, sorted.
        missing: Vec<String>,
    },

    /// An operation name is blank.
    #[error("operation names must not be empty")]
    EmptyOperationName,
}
