//! Key encoding utilities for `RocksDB` and the key-value store.
//!
//! This module provides functions for encoding and decoding keys used in column
//! families, plus the string keys shared by the balance cache and rate limiter.

use shared_ledger_core::{EntryId, Nonce, OwnerId};

/// Separator between owner id and entry id in the owner index.
///
/// Owner ids are arbitrary strings, so a terminator is needed to stop owner `u1`
/// from prefix-matching owner `u10`.
const OWNER_SEPARATOR: u8 = 0x00;

/// Create an entry key from an entry id.
#[must_use]
pub fn entry_key(id: EntryId) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

/// Create a nonce index key.
#[must_use]
pub fn nonce_key(nonce: &Nonce) -> Vec<u8> {
    nonce.as_str().as_bytes().to_vec()
}

/// Create a running-balance key.
#[must_use]
pub fn balance_key(owner_id: &OwnerId) -> Vec<u8> {
    owner_id.as_str().as_bytes().to_vec()
}

/// Create an owner-entry index key.
///
/// Format: `owner_id || 0x00 || entry_id (8 bytes, big-endian)`
///
/// Since entry ids are monotonic, entries for an owner sort by commit order.
#[must_use]
pub fn owner_entry_key(owner_id: &OwnerId, id: EntryId) -> Vec<u8> {
    let mut key = owner_entries_prefix(owner_id);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Create a prefix for iterating all entries for an owner.
#[must_use]
pub fn owner_entries_prefix(owner_id: &OwnerId) -> Vec<u8> {
    let owner = owner_id.as_str().as_bytes();
    let mut key = Vec::with_capacity(owner.len() + 9);
    key.extend_from_slice(owner);
    key.push(OWNER_SEPARATOR);
    key
}

/// Extract the entry id from an owner-entry index key.
///
/// Returns `None` if the key is shorter than an entry id.
#[must_use]
pub fn extract_entry_id_from_owner_key(key: &[u8]) -> Option<EntryId> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(EntryId::from_be_bytes(bytes))
}

/// Encode a signed amount or balance.
#[must_use]
pub fn encode_i64(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a signed amount or balance, `None` on a malformed value.
#[must_use]
pub fn decode_i64(bytes: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

/// Cache key for an owner's balance.
#[must_use]
pub fn balance_cache_key(owner_id: &OwnerId) -> String {
    format!("balance:{owner_id}")
}

/// Counter key for a client calling an endpoint.
#[must_use]
pub fn rate_limit_key(client: &str, endpoint: &str) -> String {
    format!("ratelimit:{client}:{endpoint}")
}
