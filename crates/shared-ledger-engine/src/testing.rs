//! Test doubles shared by the unit tests.

use std::time::Duration;

use async_trait::async_trait;
use shared_ledger_store::{KvStore, Result, StoreError};

/// Key-value store whose every call fails as if the server were down.
pub struct DownKv;

fn refused<T>() -> Result<T> {
    Err(StoreError::Unavailable("connection refused".into()))
}

#[async_trait]
impl KvStore for DownKv {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        refused()
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        refused()
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        refused()
    }

    async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<i64> {
        refused()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
        refused()
    }
}
