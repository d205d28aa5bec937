//! Authentication extractors.
//!
//! Provides extractors for requiring a signed-in user (and, for admin
//! routes, the admin role) in route handlers. Rejections are `AppError`s so
//! clients always get the JSON error body.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use unimarket_core::UserRole;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts)
            .await?
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts).await.ok().flatten()))
    }
}

/// Extractor that requires a signed-in admin.
///
/// The role in the session is a login-time snapshot, so it is re-read from
/// the database: a demoted admin loses access immediately.
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;

        let stored = UserRepository::new(state.pool())
            .get_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))?;

        if stored.role != UserRole::Admin {
            tracing::warn!(user_id = %user.id, "Non-admin tried an admin route");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(Self(CurrentUser {
            role: stored.role,
            ..user
        }))
    }
}

async fn current_user(parts: &Parts) -> Result<Option<CurrentUser>, AppError> {
    // Get the session from extensions (set by SessionManagerLayer)
    let Some(session) = parts.extensions.get::<Session>() else {
        return Ok(None);
    };

    Ok(session.get(session_keys::CURRENT_USER).await?)
}

/// Helper to set the current user in the session.
///
/// Cycles the session id to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
