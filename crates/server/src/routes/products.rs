//! Product listing handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;

use unimarket_core::{ProductId, ProductStatus, UserId};

use crate::db::ProductRepository;
use crate::error::AppError;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{NewProduct, Product, ProductFilter, ProductListing, ProductPatch};
use crate::state::AppState;

/// Search available listings.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductListing>>, AppError> {
    let listings = ProductRepository::new(state.pool())
        .list_available(&filter)
        .await?;
    Ok(Json(listings))
}

/// Listing detail.
///
/// Archived listings are only visible to their seller.
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductListing>, AppError> {
    let listing = ProductRepository::new(state.pool())
        .get_listing(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let is_seller = user.is_some_and(|u| u.id == listing.product.seller_id);
    if listing.product.status == ProductStatus::Archived && !is_seller {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    Ok(Json(listing))
}

/// Create a listing owned by the caller.
#[instrument(skip(state, user, product), fields(seller_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = product.validate()?;
    let created = ProductRepository::new(state.pool())
        .create(user.id, &product)
        .await?;
    tracing::info!(product_id = %created.id, "Product listed");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update the caller's own available listing.
#[instrument(skip(state, user, patch), fields(seller_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>, AppError> {
    let patch = patch.validate()?;
    let repo = ProductRepository::new(state.pool());

    match repo.update(id, user.id, &patch).await? {
        Some(product) => Ok(Json(product)),
        None => Err(explain_refusal(&repo, id, user.id, "changed").await),
    }
}

/// Archive the caller's own available listing.
#[instrument(skip(state, user), fields(seller_id = %user.id))]
pub async fn archive(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
) -> Result<StatusCode, AppError> {
    let repo = ProductRepository::new(state.pool());

    if repo.archive(id, user.id).await? {
        tracing::info!(product_id = %id, "Product archived");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(explain_refusal(&repo, id, user.id, "removed").await)
    }
}

/// The caller's listings in any status.
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Product>>, AppError> {
    let products = ProductRepository::new(state.pool())
        .list_by_seller(user.id)
        .await?;
    Ok(Json(products))
}

/// Work out why a conditional update touched no row.
async fn explain_refusal(
    repo: &ProductRepository<'_>,
    id: ProductId,
    seller_id: UserId,
    action: &str,
) -> AppError {
    let product = match repo.get(id).await {
        Ok(product) => product,
        Err(e) => return e.into(),
    };

    match product {
        Some(p) if p.seller_id != seller_id => {
            AppError::Forbidden("You can only manage your own listings".to_string())
        }
        Some(p) if p.status == ProductStatus::Sold => {
            AppError::Conflict(format!("Sold products cannot be {action}"))
        }
        _ => AppError::NotFound("Product not found".to_string()),
    }
}
