//! Rate limiting middleware.
//!
//! Counts requests per client address and request path through the shared
//! [`RateLimiter`](shared_ledger_engine::RateLimiter), so limits hold across
//! replicas when the counters live in Redis.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Reject requests over the configured per-window budget with 429.
///
/// The caller is authenticated first, so rejected credentials never spend a
/// client's budget.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    request: Request,
    next: Next,
) -> Response {
    let client = client_address(&request);
    let endpoint = request.uri().path().to_owned();

    match state.limiter.check(&client, &endpoint).await {
        Ok(_) => next.run(request).await,
        Err(err) => {
            tracing::warn!(
                client = %client,
                caller = %auth.subject,
                endpoint = %endpoint,
                "Rate limit exceeded"
            );
            ApiError::from(err).into_response()
        }
    }
}

/// The peer address, then the first `X-Forwarded-For` hop, then `unknown`.
fn client_address(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .or_else(|| forwarded_for(request.headers()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
