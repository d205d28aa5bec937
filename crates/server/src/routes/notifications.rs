//! Notification inbox handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use unimarket_core::NotificationId;

use crate::db::NotificationRepository;
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::Notification;
use crate::routes::Marked;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = NotificationRepository::new(state.pool())
        .list(user.id, query.unread_only)
        .await?;
    Ok(Json(notifications))
}

/// Mark one of the caller's notifications read. Other users' ids are 404.
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode, AppError> {
    NotificationRepository::new(state.pool())
        .mark_read(id, user.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Marked>, AppError> {
    let marked = NotificationRepository::new(state.pool())
        .mark_all_read(user.id)
        .await?;
    Ok(Json(Marked { marked }))
}
