//! Authentication service.
//!
//! Email + password accounts restricted to university email domains.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;
use tracing::{info, instrument};

use unimarket_core::Email;

use crate::db::RepositoryError;
use crate::db::users::{NewUser, UserRepository};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted display name.
const MAX_NAME_LENGTH: usize = 100;

/// Registration input.
#[derive(Debug, Clone)]
pub struct Registration<'r> {
    pub email: &'r str,
    pub password: &'r str,
    pub name: &'r str,
    pub phone: Option<&'r str>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    allowed_domains: &'a [String],
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    ///
    /// An empty `allowed_domains` accepts any email domain.
    #[must_use]
    pub const fn new(pool: &'a PgPool, allowed_domains: &'a [String]) -> Self {
        Self {
            users: UserRepository::new(pool),
            allowed_domains,
        }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::DomainNotAllowed` for non-university addresses.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip_all)]
    pub async fn register(&self, registration: &Registration<'_>) -> Result<User, AuthError> {
        let email = Email::parse(registration.email)?;
        check_domain(&email, self.allowed_domains)?;
        validate_password(registration.password)?;
        let name = validate_name(registration.name)?;

        let password_hash = hash_password(registration.password)?;

        let new_user = NewUser {
            email,
            name,
            phone: registration
                .phone
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
        };

        let user = self
            .users
            .create_with_password(&new_user, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        // Malformed emails get the same answer as unknown ones
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }
}

fn check_domain(email: &Email, allowed: &[String]) -> Result<(), AuthError> {
    if allowed.is_empty() || email.is_in_domains(allowed) {
        Ok(())
    } else {
        Err(AuthError::DomainNotAllowed)
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse battery", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_corrupt_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345678").is_ok());
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Siti Rahma ").unwrap(), "Siti Rahma");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(101)).is_err());
        assert!(validate_name(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_check_domain() {
        let email = Email::parse("student@mail.ui.ac.id").unwrap();
        let allowed = vec!["ui.ac.id".to_string(), "itb.ac.id".to_string()];

        assert!(check_domain(&email, &allowed).is_ok());
        assert!(check_domain(&email, &[]).is_ok());
        assert!(matches!(
            check_domain(&email, &["ugm.ac.id".to_string()]),
            Err(AuthError::DomainNotAllowed)
        ));
    }
}
