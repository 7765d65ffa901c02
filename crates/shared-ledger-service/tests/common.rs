//! Common test utilities for shared-ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use tempfile::TempDir;

use shared_ledger_service::auth::Claims;
use shared_ledger_service::{create_router, AppState, ServiceConfig};
use shared_ledger_store::{MemoryKv, RocksStore};

/// Secret shared by the harness and its minted tokens.
pub const JWT_SECRET: &str = "test-secret";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// Shared key-value store, for inspecting cache keys.
    pub kv: Arc<MemoryKv>,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and default limits.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        let kv = Arc::new(MemoryKv::new());

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            jwt_secret: Some(JWT_SECRET.into()),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state =
            AppState::new(Arc::new(store), kv.clone(), config).expect("Failed to build state");
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            kv,
        }
    }

    /// Authorization header with a valid token for `subject`.
    pub fn auth_header(subject: &str) -> String {
        format!("Bearer {}", mint_token(subject, JWT_SECRET, 3600))
    }

    /// Authorization header for the default test caller.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header("test-user")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// HS256 token expiring `ttl_seconds` from now (negative for expired tokens).
pub fn mint_token(subject: &str, secret: &str, ttl_seconds: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + ttl_seconds;
    let claims = Claims {
        sub: subject.to_string(),
        exp: u64::try_from(exp).unwrap_or(0),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to encode token")
}
