//! Admin withdrawal review.
//!
//! Every handler takes [`RequireAdmin`], which re-checks the role against the
//! database.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use unimarket_core::{WithdrawalId, WithdrawalStatus};

use crate::db::WithdrawalRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::Withdrawal;
use crate::services::payouts::PayoutService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

/// Withdrawals, optionally filtered by status.
pub async fn withdrawals(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<WithdrawalQuery>,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let withdrawals = WithdrawalRepository::new(state.pool())
        .list(query.status)
        .await?;
    Ok(Json(withdrawals))
}

/// Approve a pending withdrawal and disburse it through the provider it was
/// requested with.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn approve(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<WithdrawalId>,
) -> Result<Json<Withdrawal>, AppError> {
    let withdrawal = WithdrawalRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Withdrawal not found".to_string()))?;

    let gateway = state.disburser(withdrawal.provider);
    let approved = PayoutService::new(state.pool(), state.realtime(), withdrawal.provider)
        .approve(&gateway, id, admin.id)
        .await?;
    Ok(Json(approved))
}

/// Reject a pending withdrawal and refund the seller.
#[instrument(skip(state, admin, request), fields(admin_id = %admin.id))]
pub async fn reject(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<WithdrawalId>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    let rejected = PayoutService::new(
        state.pool(),
        state.realtime(),
        state.config().payouts.provider,
    )
    .reject(id, admin.id, &request.reason)
    .await?;
    Ok(Json(rejected))
}
