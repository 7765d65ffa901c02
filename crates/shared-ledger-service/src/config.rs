//! Service configuration.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;

use shared_ledger_core::CatalogError;
use shared_ledger_engine::RateLimitConfig;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Environment variable name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation catalog is incomplete or malformed.
    #[error("invalid operation catalog: {0}")]
    Catalog(#[from] CatalogError),
}

/// Service configuration loaded from environment variables.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/shared-ledger").
    pub data_dir: String,

    /// PostgreSQL URL. When set, entries are stored in PostgreSQL instead of `RocksDB`.
    pub database_url: Option<String>,

    /// PostgreSQL connection pool size (default: 5).
    pub database_pool_size: u32,

    /// Redis URL for the balance cache and rate-limit counters.
    /// When unset, both live in process memory.
    pub redis_url: Option<String>,

    /// HS256 secret for bearer tokens. Without it every authenticated request is rejected.
    pub jwt_secret: Option<String>,

    /// Requests allowed per client and endpoint per window (default: 100).
    pub rate_limit_requests: u32,

    /// Rate-limit window in seconds (default: 60).
    pub rate_limit_window_seconds: u64,

    /// Balance cache TTL in seconds (default: 360).
    pub cache_ttl_seconds: u64,

    /// Limit for a single entry store call in milliseconds (default: 5000).
    pub storage_timeout_ms: u64,

    /// App-specific operations layered over the shared baseline.
    pub operations: BTreeMap<String, i64>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a malformed value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if let Some(url) = &database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(ConfigError::Invalid {
                    name: "DATABASE_URL",
                    reason: "must start with 'postgres://' or 'postgresql://'".into(),
                });
            }
        }

        let operations = match lookup("LEDGER_OPERATIONS") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                name: "LEDGER_OPERATIONS",
                reason: e.to_string(),
            })?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: lookup("DATA_DIR").unwrap_or(defaults.data_dir),
            database_url,
            database_pool_size: parse(&lookup, "DATABASE_POOL_SIZE", defaults.database_pool_size)?,
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            jwt_secret: lookup("JWT_SECRET_KEY").filter(|s| !s.is_empty()),
            rate_limit_requests: parse(
                &lookup,
                "RATE_LIMIT_REQUESTS_PER_MINUTE",
                defaults.rate_limit_requests,
            )?,
            rate_limit_window_seconds: parse_positive(
                &lookup,
                "RATE_LIMIT_WINDOW_SECONDS",
                defaults.rate_limit_window_seconds,
            )?,
            cache_ttl_seconds: parse(&lookup, "CACHE_DEFAULT_TTL", defaults.cache_ttl_seconds)?,
            storage_timeout_ms: parse(&lookup, "STORAGE_TIMEOUT_MS", defaults.storage_timeout_ms)?,
            operations,
            cors_origins: lookup("CORS_ORIGINS")
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: parse(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
            request_timeout_seconds: parse(
                &lookup,
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            )?,
        })
    }

    /// Rate limiter settings.
    #[must_use]
    pub const fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_requests,
            window: Duration::from_secs(self.rate_limit_window_seconds),
        }
    }

    /// Balance cache TTL.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Entry store call limit.
    #[must_use]
    pub const fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

fn parse<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Like [`parse`], but zero is rejected.
fn parse_positive<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse(lookup, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".into(),
        }),
        value => Ok(value),
    }
}

/// Secrets and connection strings are shown only as present or absent.
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";

        f.debug_struct("ServiceConfig")
            .field("listen_addr", &self.listen_addr)
            .field("data_dir", &self.data_dir)
            .field("database_url", &self.database_url.as_ref().map(|_| REDACTED))
            .field("database_pool_size", &self.database_pool_size)
            .field("redis_url", &self.redis_url.as_ref().map(|_| REDACTED))
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| REDACTED))
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_seconds", &self.rate_limit_window_seconds)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("storage_timeout_ms", &self.storage_timeout_ms)
            .field("operations", &self.operations)
            .field("cors_origins", &self.cors_origins)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/shared-ledger".into(),
            database_url: None,
            database_pool_size: 5,
            redis_url: None,
            jwt_secret: None,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            cache_ttl_seconds: 360,
            storage_timeout_ms: 5000,
            operations: BTreeMap::new(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024, // 1MB
            request_timeout_seconds: 30,
        }
    }
}
