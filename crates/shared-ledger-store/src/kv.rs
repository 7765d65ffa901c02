//! Key-value store implementations.
//!
//! Both backends store plain strings with a per-key deadline. `MemoryKv` keeps
//! everything in one process and measures time with `tokio::time::Instant`, so
//! paused-clock tests can step through expiry. `RedisKv` shares state between
//! service replicas.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, StoreError};
use crate::KvStore;

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Minimum time between sweeps of expired slots.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Slots {
    map: HashMap<String, Slot>,
    last_sweep: Option<Instant>,
}

impl Slots {
    /// Drop expired slots, at most once per `SWEEP_INTERVAL`.
    fn sweep(&mut self, now: Instant) {
        let due = self
            .last_sweep
            .map_or(true, |last| now.saturating_duration_since(last) >= SWEEP_INTERVAL);
        if !due {
            return;
        }

        let before = self.map.len();
        self.map.retain(|_, slot| slot.is_live(now));
        self.last_sweep = Some(now);

        let evicted = before - self.map.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.map.len(), "Swept expired keys");
        }
    }
}

/// Process-local key-value store.
///
/// Expired keys are invisible immediately and are evicted by a sweep that
/// runs on writes, at most once per minute.
#[derive(Debug, Default)]
pub struct MemoryKv {
    slots: Mutex<Slots>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .await
            .map
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    /// Whether no live keys remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    async fn stored(&self) -> usize {
        self.slots.lock().await.map.len()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;

        match slots.map.get(key) {
            Some(slot) if slot.is_live(now) => Ok(Some(slot.value.clone())),
            Some(_) => {
                slots.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        slots.sweep(now);

        slots.map.insert(
            key.to_owned(),
            Slot {
                value: value.to_owned(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.slots.lock().await.map.remove(key);
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        slots.sweep(now);

        let current = match slots.map.get(key) {
            Some(slot) if slot.is_live(now) => Some(slot),
            _ => None,
        };

        let (count, expires_at) = match current {
            Some(slot) => {
                let count = slot
                    .value
                    .parse::<i64>()
                    .map_err(|e| StoreError::Serialization(format!("{key} is not a counter: {e}")))?;
                (count + 1, slot.expires_at)
            }
            None => (1, Some(now + ttl)),
        };

        slots.map.insert(
            key.to_owned(),
            Slot {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let slots = self.slots.lock().await;

        Ok(slots
            .map
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }
}

// =============================================================================
// Redis store
// =============================================================================

/// INCR then PEXPIRE on creation, as one server-side step.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Redis-backed key-value store.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
    incr_script: Script,
}

impl RedisKv {
    /// Connect to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis key-value store");
        Ok(Self::new(conn))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_script: Script::new(INCR_WITH_EXPIRY),
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.conn.clone().get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _: i64 = self.conn.clone().del(key).await?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .incr_script
            .key(key)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let remaining: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;

        // -2 means missing, -1 means no expiry.
        Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
    }
}
