//! Ledger handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use shared_ledger_core::{LedgerBalance, LedgerEntry, LedgerError, Nonce, OwnerId};
use shared_ledger_engine::DEFAULT_HISTORY_LIMIT;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Request to record a ledger entry.
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    /// Catalog operation name.
    pub operation: String,
    /// Owner whose balance moves.
    pub owner_id: String,
    /// Idempotency token.
    pub nonce: String,
    /// Accepted for compatibility and ignored; the catalog sets the amount.
    #[serde(default)]
    pub amount: Option<i64>,
}

/// Response for a recorded entry.
#[derive(Debug, Serialize)]
pub struct CreateEntryResponse {
    /// Always "success".
    pub status: String,
    /// Human-readable confirmation.
    pub message: String,
    /// Store-assigned entry id.
    pub entry_id: i64,
}

/// Pagination for entry history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Page size.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Entries to skip, newest first.
    #[serde(default)]
    pub offset: Option<usize>,
}

fn parse_owner(raw: String) -> Result<OwnerId, ApiError> {
    OwnerId::new(raw).map_err(|e| ApiError::from(LedgerError::from(e)))
}

/// Get an owner's balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(owner_id): Path<String>,
) -> Result<Json<LedgerBalance>, ApiError> {
    let owner_id = parse_owner(owner_id)?;

    tracing::debug!(caller = %auth.subject, owner_id = %owner_id, "Balance requested");

    let balance = state.ledger.get_balance(&owner_id).await?;

    Ok(Json(LedgerBalance { owner_id, balance }))
}

/// List an owner's entries, newest first.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(owner_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let owner_id = parse_owner(owner_id)?;

    tracing::debug!(caller = %auth.subject, owner_id = %owner_id, "Entry history requested");

    let entries = state
        .ledger
        .history(
            &owner_id,
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(entries))
}

/// Record a ledger entry.
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateEntryRequest>,
) -> Result<Json<CreateEntryResponse>, ApiError> {
    let owner_id = parse_owner(body.owner_id)?;
    let nonce = Nonce::new(body.nonce).map_err(|e| ApiError::from(LedgerError::from(e)))?;

    if let Some(amount) = body.amount {
        tracing::debug!(
            caller = %auth.subject,
            requested_amount = amount,
            "Ignoring client-supplied amount"
        );
    }

    let entry = state
        .ledger
        .create_entry(&body.operation, &owner_id, &nonce)
        .await?;

    tracing::info!(
        caller = %auth.subject,
        entry_id = entry.id.get(),
        owner_id = %entry.owner_id,
        operation = %entry.operation,
        amount = entry.amount,
        "Ledger entry recorded"
    );

    Ok(Json(CreateEntryResponse {
        status: "success".to_string(),
        message: "Ledger entry created successfully".to_string(),
        entry_id: entry.id.get(),
    }))
}
