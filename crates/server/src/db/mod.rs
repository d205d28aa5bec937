//! Database operations for the marketplace `PostgreSQL`.
//!
//! ## Tables
//!
//! - `users` / `user_passwords` - Accounts, balances, payout accounts
//! - `products` / `wishlists` - Listings and saved listings
//! - `conversations` / `messages` - Buyer/seller chat
//! - `notifications` - In-app notifications
//! - `transactions` - Midtrans checkouts
//! - `withdrawals` - Seller payouts through Flip or Xendit
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! Queries are checked at runtime (`query_as` + `FromRow`), so the crate
//! builds without a live database.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p unimarket-cli -- migrate
//! ```

pub mod chat;
pub mod notifications;
pub mod products;
pub mod transactions;
pub mod users;
pub mod wishlists;
pub mod withdrawals;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use chat::ChatRepository;
pub use notifications::NotificationRepository;
pub use products::ProductRepository;
pub use transactions::TransactionRepository;
pub use users::UserRepository;
pub use wishlists::WishlistRepository;
pub use withdrawals::WithdrawalRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign-key violations to `Conflict` / `NotFound`.
    pub(crate) fn from_constraint(err: sqlx::Error, conflict_message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return Self::Conflict(conflict_message.to_owned());
            }
            if db_err.is_foreign_key_violation() {
                return Self::NotFound;
            }
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
