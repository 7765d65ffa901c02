//! Authentication extractors.
//!
//! Ledger routes take an `Authorization: Bearer <token>` header carrying an
//! HS256 JWT signed with `JWT_SECRET_KEY`. Token issuance happens elsewhere;
//! this service only validates signature and expiry and reads the subject.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated caller extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The `sub` claim.
    pub subject: String,
}

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (caller identity).
    pub sub: String,
    /// Expiration time, seconds since the epoch.
    pub exp: u64,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            let claims = validate_jwt(token, state)?;

            Ok(AuthUser {
                subject: claims.sub,
            })
        })
    }
}

/// Validate a token's signature and expiry.
fn validate_jwt(token: &str, state: &AppState) -> Result<Claims, ApiError> {
    let key = state.jwt_key.as_ref().ok_or(ApiError::Unauthorized)?;

    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<Claims>(token, key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    if token_data.claims.sub.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    Ok(token_data.claims)
}
