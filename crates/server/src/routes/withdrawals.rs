//! Seller wallet and withdrawal requests.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use unimarket_core::Rupiah;

use crate::config::MIN_WITHDRAWAL;
use crate::db::{UserRepository, WithdrawalRepository};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::Withdrawal;
use crate::services::payouts::PayoutService;
use crate::state::AppState;

/// Wallet summary.
#[derive(Debug, Serialize)]
pub struct Wallet {
    pub balance: Rupiah,
    pub min_withdrawal: Rupiah,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Rupiah,
}

pub async fn wallet(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Wallet>, AppError> {
    let balance = UserRepository::new(state.pool()).balance(user.id).await?;
    Ok(Json(Wallet {
        balance,
        min_withdrawal: MIN_WITHDRAWAL,
    }))
}

/// The caller's withdrawal history, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let withdrawals = WithdrawalRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(withdrawals))
}

/// Request a withdrawal; the amount leaves the balance immediately.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), AppError> {
    let withdrawal = PayoutService::new(
        state.pool(),
        state.realtime(),
        state.config().payouts.provider,
    )
    .request_withdrawal(user.id, request.amount)
    .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}
