//! Error types for ledger storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Nonce already used (uniqueness constraint).
    #[error("duplicate nonce: {nonce}")]
    DuplicateNonce {
        /// The nonce that was already recorded.
        nonce: String,
    },

    /// The entry would leave the running balance negative.
    #[error("insufficient balance: balance={balance}, amount={amount}")]
    InsufficientBalance {
        /// Running balance before the entry.
        balance: i64,
        /// Signed entry amount.
        amount: i64,
    },

    /// A lock or round-trip did not complete in time.
    #[error("storage timeout: {0}")]
    Timeout(String),

    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the failure is a constraint rejection rather than an outage.
    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNonce { .. } | Self::InsufficientBalance { .. }
        )
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Database(err.to_string())
        }
    }
}
