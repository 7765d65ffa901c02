//! Fixed-window rate limiter.
//!
//! Each `(client, endpoint)` pair gets a counter under
//! `ratelimit:{client}:{endpoint}`. The first request creates the counter and
//! starts its window; the window ends exactly `window` later, independent of
//! wall-clock boundaries. Counting is a single atomic increment-with-expiry,
//! and a request is rejected when its increment takes the count past the limit.

use std::sync::Arc;
use std::time::Duration;

use shared_ledger_core::{LedgerError, Result};
use shared_ledger_store::{keys, KvStore};

use crate::events::{EventSink, LedgerEvent, TracingSink};

/// Rate limiting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// An admitted request's position in its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Configured limit.
    pub limit: u32,
    /// Requests still allowed in this window.
    pub remaining: u32,
}

/// Counts requests per client and endpoint.
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    config: RateLimitConfig,
    events: Arc<dyn EventSink>,
}

impl RateLimiter {
    /// Create a limiter over a key-value store.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self {
            kv,
            config,
            events: Arc::new(TracingSink),
        }
    }

    /// Route rejection events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The active settings.
    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counter key for a client and endpoint.
    #[must_use]
    pub fn key(client: &str, endpoint: &str) -> String {
        keys::rate_limit_key(client, endpoint)
    }

    /// Count one request and decide whether it may proceed.
    ///
    /// If the counter store is unreachable the request is allowed and the
    /// bypass is reported.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::RateLimitExceeded` once the window's budget is spent.
    pub async fn check(&self, client: &str, endpoint: &str) -> Result<RateLimitStatus> {
        let key = Self::key(client, endpoint);
        let limit = self.config.max_requests;

        let count = match self.kv.incr_with_expiry(&key, self.config.window).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limit counter unavailable");
                self.events.emit(&LedgerEvent::RateLimiterBypassed { key });
                return Ok(RateLimitStatus {
                    limit,
                    remaining: limit,
                });
            }
        };

        if count > i64::from(limit) {
            let retry_after = match self.kv.ttl(&key).await {
                Ok(ttl) => ttl.or(Some(self.config.window)),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Could not read rate limit window");
                    None
                }
            };

            self.events
                .emit(&LedgerEvent::RateLimited { key: key.clone() });
            return Err(LedgerError::RateLimitExceeded { key, retry_after });
        }

        let used = u32::try_from(count).unwrap_or(limit);
        Ok(RateLimitStatus {
            limit,
            remaining: limit.saturating_sub(used),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_ledger_store::MemoryKv;

    use crate::events::CollectingSink;
    use crate::testing::DownKv;

    fn limiter(max_requests: u32, window: Duration) -> (RateLimiter, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let limiter = RateLimiter::new(
            Arc::new(MemoryKv::new()),
            RateLimitConfig {
                max_requests,
                window,
            },
        )
        .with_events(sink.clone());
        (limiter, sink)
    }

    #[test]
    fn key_format() {
        assert_eq!(
            RateLimiter::key("127.0.0.1", "/ledger/"),
            "ratelimit:127.0.0.1:/ledger/"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_after_limit_until_window_ends() {
        let window = Duration::from_secs(60);
        let (limiter, sink) = limiter(3, window);

        for expected_remaining in [2, 1, 0] {
            let status = limiter.check("c1", "/ledger/").await.unwrap();
            assert_eq!(status.remaining, expected_remaining);
        }

        let err = limiter.check("c1", "/ledger/").await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::RateLimitExceeded {
                key: "ratelimit:c1:/ledger/".into(),
                retry_after: Some(window),
            }
        );
        assert_eq!(sink.count("rate_limited"), 1);

        tokio::time::advance(window).await;
        assert!(limiter.check("c1", "/ledger/").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn window_starts_at_first_request() {
        let (limiter, _sink) = limiter(1, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.check("c1", "/ledger/").await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        let err = limiter.check("c1", "/ledger/").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::RateLimitExceeded { retry_after: Some(d), .. } if d == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (limiter, _sink) = limiter(1, Duration::from_secs(60));

        limiter.check("c1", "/ledger/").await.unwrap();
        limiter.check("c2", "/ledger/").await.unwrap();
        limiter.check("c1", "/ledger/u1").await.unwrap();
        assert!(limiter.check("c1", "/ledger/").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_admit_exactly_the_limit() {
        let (limiter, _sink) = limiter(10, Duration::from_secs(60));
        let limiter = Arc::new(limiter);

        let tasks: Vec<_> = (0..40)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("c1", "/ledger/").await.is_ok() })
            })
            .collect();

        let admitted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn unavailable_counter_fails_open() {
        let sink = Arc::new(CollectingSink::new());
        let limiter = RateLimiter::new(Arc::new(DownKv), RateLimitConfig::default())
            .with_events(sink.clone());

        let status = limiter.check("c1", "/ledger/").await.unwrap();
        assert_eq!(status.remaining, 100);
        assert_eq!(sink.count("rate_limiter_bypassed"), 1);
    }
}
