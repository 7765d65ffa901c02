//! Core types and utilities for the shared ledger.
//!
//! This crate provides the foundational types used throughout the ledger platform:
//!
//! - **Identifiers**: `OwnerId`, `Nonce`, `EntryId`
//! - **Entries**: `LedgerEntry`, `NewEntry`, `LedgerBalance`
//! - **Operations**: `OperationCatalog` and the shared baseline operation set
//! - **Errors**: `LedgerError`, `CatalogError`
//!
//! # Balances
//!
//! A balance is never stored as a source of truth. It is the sum of the signed
//! `amount` of every entry recorded for an owner, and it must never drop below
//! zero after a committed entry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod entry;
pub mod error;
pub mod ids;

pub use catalog::{
    OperationCatalog, CREDIT_ADD, CREDIT_SPEND, DAILY_REWARD, SHARED_OPERATIONS, SIGNUP_CREDIT,
};
pub use entry::{LedgerBalance, LedgerEntry, NewEntry};
pub use error::{CatalogError, FailureKind, LedgerError, Result};
pub use ids::{EntryId, IdError, Nonce, OwnerId, MAX_ID_LEN};
