//! Checkout and purchase history handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use unimarket_core::ProductId;

use crate::db::TransactionRepository;
use crate::error::AppError;
use crate::gateways::GatewayError;
use crate::middleware::RequireAuth;
use crate::models::Transaction;
use crate::services::checkout::CheckoutService;
use crate::services::reconciliation::Reconciler;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTransaction {
    pub product_id: ProductId,
}

/// Which side of the caller's transactions to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Buyer,
    Seller,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub role: Side,
}

/// Start a Midtrans checkout for a product.
///
/// The response carries `snap_token` and `redirect_url` for the Snap popup.
#[instrument(skip(state, user), fields(buyer_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CreateTransaction>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let config = state.config();
    let transaction = CheckoutService::new(
        state.pool(),
        state.midtrans(),
        &config.base_url,
        config.payouts.platform_fee_percent,
    )
    .create(user.id, request.product_id)
    .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// The caller's purchases (`role=buyer`, default) or sales (`role=seller`).
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let repo = TransactionRepository::new(state.pool());
    let transactions = match query.role {
        Side::Buyer => repo.list_for_buyer(user.id).await?,
        Side::Seller => repo.list_for_seller(user.id).await?,
    };
    Ok(Json(transactions))
}

/// A transaction the caller bought or sold.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = TransactionRepository::new(state.pool())
        .get_by_order_id(&order_id)
        .await?
        .filter(|t| t.involves(user.id))
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;
    Ok(Json(transaction))
}

/// Re-read the status from Midtrans and apply it.
///
/// Used by the frontend after the Snap popup closes, in case the webhook is
/// late. Applying goes through the same reconciliation as the webhook, so a
/// webhook arriving afterwards is a no-op.
#[instrument(skip(state, user), fields(buyer_id = %user.id))]
pub async fn sync(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let repo = TransactionRepository::new(state.pool());
    let transaction = repo
        .get_by_order_id(&order_id)
        .await?
        .filter(|t| t.buyer_id == user.id)
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    if transaction.status.is_final() {
        return Ok(Json(transaction));
    }

    match state.midtrans().transaction_status(&order_id).await {
        Ok(status) => {
            let outcome = Reconciler::new(&state).apply_midtrans(&status).await?;
            tracing::info!(?outcome, "Transaction synced");
        }
        // Midtrans has no record until the buyer picks a payment method
        Err(GatewayError::Api { status: 404, .. }) => {
            return Ok(Json(transaction));
        }
        Err(e) => return Err(e.into()),
    }

    let refreshed = repo
        .get_by_order_id(&order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;
    Ok(Json(refreshed))
}
