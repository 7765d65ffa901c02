//! Shared Ledger HTTP API Service.
//!
//! This crate exposes the shared ledger over HTTP:
//!
//! - Owner balances, served through the balance cache
//! - Entry history
//! - Idempotent entry creation priced by the operation catalog
//!
//! # Authentication
//!
//! Ledger routes require an HS256 JWT bearer token signed with
//! `JWT_SECRET_KEY`. Every ledger route is rate limited per client address and
//! path.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Health handler is async for routing

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
