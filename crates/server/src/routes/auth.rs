//! Registration, login and logout.
//!
//! Sign-in state lives in the session as a [`CurrentUser`]; the session id
//! is cycled on every sign-in.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthService, Registration};
use crate::state::AppState;

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Create an account and sign it in.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let auth = AuthService::new(state.pool(), &state.config().allowed_email_domains);
    let user = auth
        .register(&Registration {
            email: &form.email,
            password: &form.password,
            name: &form.name,
            phone: form.phone.as_deref(),
        })
        .await?;

    sign_in(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Sign in with email and password.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<LoginRequest>,
) -> Result<Json<User>, AppError> {
    let auth = AuthService::new(state.pool(), &state.config().allowed_email_domains);
    let user = auth.login(&form.email, &form.password).await?;

    sign_in(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(user))
}

/// Sign out.
pub async fn logout(session: Session) -> Result<StatusCode, AppError> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in user's profile, including balance and payout account.
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<User>, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))?;
    Ok(Json(user))
}

async fn sign_in(session: &Session, user: &User) -> Result<(), AppError> {
    let current = CurrentUser {
        id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
    };
    set_current_user(session, &current).await?;
    set_sentry_user(user.id.as_i32(), Some(user.email.as_str()));
    Ok(())
}
