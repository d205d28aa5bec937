//! Admin role management.
//!
//! Admins are ordinary registered users with the `admin` role; there is no
//! separate admin account type.
//!
//! # Usage
//!
//! ```bash
//! um-cli admin promote -e staff@ui.ac.id
//! um-cli admin demote -e staff@ui.ac.id
//! ```

use thiserror::Error;

use unimarket_core::{Email, UserRole};
use unimarket_server::db::{RepositoryError, UserRepository};

use super::{ConnectError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Nobody registered with this email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Repository(RepositoryError),
}

/// Set the role of the user registered with `email`.
///
/// # Errors
///
/// Returns `AdminError::UserNotFound` if no user has this email.
pub async fn set_role(email: &str, role: UserRole) -> Result<(), AdminError> {
    let email = Email::parse(email).map_err(|e| AdminError::InvalidEmail(e.to_string()))?;
    let pool = connect().await?;

    let user = UserRepository::new(&pool)
        .set_role(&email, role)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::UserNotFound(email.to_string()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!(
        "Role updated! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    if role == UserRole::User {
        tracing::warn!("Existing sessions keep working, but admin routes re-check the role");
    }

    Ok(())
}
