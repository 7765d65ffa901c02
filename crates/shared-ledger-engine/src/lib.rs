//! Accounting engine for the shared ledger.
//!
//! - [`LedgerEngine`]: prices entries from the [`OperationCatalog`] and commits
//!   them through an [`EntryStore`], enforcing nonce idempotency and
//!   non-negative balances.
//! - [`BalanceCache`]: read-through cache of owner balances.
//! - [`RateLimiter`]: fixed-window request counter per client and endpoint.
//! - [`Ledger`]: engine plus cache, the entry point for the HTTP layer.
//!
//! Every component takes its stores as constructor arguments, so tests can
//! swap in in-memory or failing doubles.
//!
//! [`OperationCatalog`]: shared_ledger_core::OperationCatalog
//! [`EntryStore`]: shared_ledger_store::EntryStore

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod ratelimit;

#[cfg(test)]
mod testing;

pub use cache::{BalanceCache, DEFAULT_CACHE_TTL};
pub use engine::{LedgerEngine, DEFAULT_STORAGE_TIMEOUT};
pub use events::{CollectingSink, EventSink, LedgerEvent, TracingSink};
pub use ledger::{Ledger, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use ratelimit::{RateLimitConfig, RateLimitStatus, RateLimiter};
