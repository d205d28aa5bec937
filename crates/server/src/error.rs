//! Unified error handling for the API.
//!
//! Every handler returns `Result<_, AppError>`. Errors render as
//! `{"error": {"code": "...", "message": "..."}}`; server-side failures are
//! reported to Sentry and their details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::gateways::GatewayError;
use crate::models::ValidationError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::payouts::PayoutError;
use crate::services::reconciliation::WebhookError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// A payment or disbursement gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with the current state of a resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => "not_found",
            Self::Database(RepositoryError::Conflict(_)) | Self::Conflict(_) => "conflict",
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => "internal",
            Self::Gateway(_) => "gateway_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
        }
    }

    /// Message safe to show the client.
    fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(message)) => message.clone(),
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Gateway(_) => "Payment provider error".to_string(),
            Self::NotFound(message)
            | Self::Unauthorized(message)
            | Self::Forbidden(message)
            | Self::BadRequest(message)
            | Self::Conflict(message) => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.0)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_string()),
            AuthError::UserAlreadyExists => {
                Self::Conflict("An account with this email already exists".to_string())
            }
            AuthError::InvalidEmail(_)
            | AuthError::DomainNotAllowed
            | AuthError::WeakPassword(_)
            | AuthError::InvalidName(_) => Self::BadRequest(err.to_string()),
            AuthError::Repository(e) => Self::Database(e),
            AuthError::PasswordHash => Self::Internal(err.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::ProductNotFound => Self::NotFound(err.to_string()),
            CheckoutError::ProductUnavailable => Self::Conflict(err.to_string()),
            CheckoutError::OwnProduct => Self::BadRequest(err.to_string()),
            CheckoutError::Gateway(e) => Self::Gateway(e),
            CheckoutError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        match err {
            PayoutError::BelowMinimum | PayoutError::NoPayoutAccount | PayoutError::MissingReason => {
                Self::BadRequest(err.to_string())
            }
            PayoutError::InsufficientBalance | PayoutError::NotPending(_) => {
                Self::Conflict(err.to_string())
            }
            PayoutError::NotFound => Self::NotFound(err.to_string()),
            PayoutError::Gateway { source, .. } => Self::Gateway(source),
            PayoutError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidSignature | WebhookError::InvalidToken => {
                Self::Unauthorized(err.to_string())
            }
            WebhookError::UnknownOrder(_) | WebhookError::UnknownWithdrawal(_) => {
                Self::NotFound(err.to_string())
            }
            WebhookError::AmountMismatch { .. } | WebhookError::Malformed(_) => {
                Self::BadRequest(err.to_string())
            }
            WebhookError::Repository(e) => Self::Database(e),
        }
    }
}

/// Set the Sentry user context from the signed-in user.
pub fn set_sentry_user(user_id: i32, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order-123".to_string());
        assert_eq!(err.to_string(), "Not found: order-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(get_status(AppError::NotFound("test".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(get_status(AppError::Forbidden("test".to_string())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::BadRequest("test".to_string())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::Conflict("test".to_string())), StatusCode::CONFLICT);
        assert_eq!(
            get_status(AppError::Database(RepositoryError::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(
                GatewayError::Api {
                    provider: "flip",
                    status: 422,
                    message: "bank code is not valid".to_string(),
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = body_json(AppError::Conflict("insufficient balance".to_string())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
        assert_eq!(body["error"]["message"], "insufficient balance");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (_, body) = body_json(AppError::Database(RepositoryError::DataCorruption(
            "balance column is null".to_string(),
        )))
        .await;
        assert_eq!(body["error"]["message"], "Internal server error");

        let (_, body) = body_json(AppError::Gateway(GatewayError::Decode {
            provider: "xendit",
            message: "missing field id".to_string(),
        }))
        .await;
        assert_eq!(body["error"]["message"], "Payment provider error");
    }

    #[test]
    fn test_service_error_mapping() {
        assert!(matches!(
            AppError::from(AuthError::InvalidCredentials),
            AppError::Unauthorized(m) if m == "Invalid credentials"
        ));
        assert!(matches!(
            AppError::from(PayoutError::InsufficientBalance),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(WebhookError::InvalidSignature),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(CheckoutError::ProductUnavailable),
            AppError::Conflict(_)
        ));
    }
}
