//! Named ledger events for external counting and tracing.

use std::sync::{Mutex, PoisonError};

use shared_ledger_core::{EntryId, FailureKind, Nonce, OwnerId};

/// Something worth counting happened in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// An entry was committed.
    EntryCreated {
        /// Store-assigned id.
        entry_id: EntryId,
        /// Owner whose balance moved.
        owner_id: OwnerId,
        /// Idempotency token.
        nonce: Nonce,
        /// Catalog operation.
        operation: String,
        /// Signed amount.
        amount: i64,
    },

    /// A balance was read.
    BalanceQueried {
        /// The owner.
        owner_id: OwnerId,
        /// Returned balance.
        balance: i64,
    },

    /// A write was rejected by a business rule.
    ValidationFailed {
        /// Which rule.
        kind: FailureKind,
        /// Requested owner.
        owner_id: OwnerId,
        /// Requested nonce.
        nonce: Nonce,
        /// Requested operation.
        operation: String,
    },

    /// Balance served from the cache.
    CacheHit {
        /// The owner.
        owner_id: OwnerId,
    },

    /// Balance recomputed from the entry store.
    CacheMiss {
        /// The owner.
        owner_id: OwnerId,
    },

    /// A request was throttled.
    RateLimited {
        /// Counter key.
        key: String,
    },

    /// The counter store failed and the request was let through.
    RateLimiterBypassed {
        /// Counter key.
        key: String,
    },
}

impl LedgerEvent {
    /// Stable event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EntryCreated { .. } => "entry_created",
            Self::BalanceQueried { .. } => "balance_queried",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::CacheHit { .. } => "cache_hit",
            Self::CacheMiss { .. } => "cache_miss",
            Self::RateLimited { .. } => "rate_limited",
            Self::RateLimiterBypassed { .. } => "rate_limiter_bypassed",
        }
    }
}

/// Receives ledger events.
pub trait EventSink: Send + Sync {
    /// Record one event. Must not block.
    fn emit(&self, event: &LedgerEvent);
}

/// Emits every event as a `tracing` event with an `event` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LedgerEvent) {
        let name = event.name();
        match event {
            LedgerEvent::EntryCreated {
                entry_id,
                owner_id,
                nonce,
                operation,
                amount,
            } => tracing::info!(
                event = name,
                entry_id = entry_id.get(),
                owner_id = %owner_id,
                nonce = %nonce,
                operation = %operation,
                amount,
                "Ledger entry created"
            ),
            LedgerEvent::BalanceQueried { owner_id, balance } => {
                tracing::debug!(event = name, owner_id = %owner_id, balance, "Balance queried");
            }
            LedgerEvent::ValidationFailed {
                kind,
                owner_id,
                nonce,
                operation,
            } => tracing::info!(
                event = name,
                kind = kind.as_str(),
                owner_id = %owner_id,
                nonce = %nonce,
                operation = %operation,
                "Ledger entry rejected"
            ),
            LedgerEvent::CacheHit { owner_id } | LedgerEvent::CacheMiss { owner_id } => {
                tracing::trace!(event = name, owner_id = %owner_id, "Balance cache lookup");
            }
            LedgerEvent::RateLimited { key } => {
                tracing::info!(event = name, key = %key, "Rate limit exceeded");
            }
            LedgerEvent::RateLimiterBypassed { key } => {
                tracing::warn!(event = name, key = %key, "Rate limiter unavailable, request allowed");
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events with the given name.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &LedgerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
