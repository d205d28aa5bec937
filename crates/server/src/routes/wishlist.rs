//! Wishlist handlers.
//!
//! Add and remove are idempotent so the frontend can toggle freely.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use unimarket_core::ProductId;

use crate::db::{RepositoryError, WishlistRepository};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::WishlistItem;
use crate::state::AppState;

pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<WishlistItem>>, AppError> {
    let items = WishlistRepository::new(state.pool()).list(user.id).await?;
    Ok(Json(items))
}

pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode, AppError> {
    match WishlistRepository::new(state.pool())
        .add(user.id, product_id)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(RepositoryError::NotFound) => Err(AppError::NotFound("Product not found".to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode, AppError> {
    WishlistRepository::new(state.pool())
        .remove(user.id, product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
