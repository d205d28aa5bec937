//! Subcommand implementations.

pub mod admin;
pub mod migrate;

use secrecy::SecretString;
use sqlx::PgPool;

/// Database URL environment variable, shared with the server.
const DATABASE_URL_VAR: &str = "MARKET_DATABASE_URL";
/// Fallback used by sqlx tooling.
const FALLBACK_DATABASE_URL_VAR: &str = "DATABASE_URL";

/// `MARKET_DATABASE_URL`, or `DATABASE_URL` when unset.
fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();

    std::env::var(DATABASE_URL_VAR)
        .or_else(|_| std::env::var(FALLBACK_DATABASE_URL_VAR))
        .ok()
        .filter(|url| !url.is_empty())
        .map(SecretString::from)
}

/// Connect to the marketplace database.
async fn connect() -> Result<PgPool, ConnectError> {
    let url = database_url().ok_or(ConnectError::MissingEnvVar(DATABASE_URL_VAR))?;
    tracing::info!("Connecting to database...");
    Ok(unimarket_server::db::create_pool(&url).await?)
}

/// Errors from opening the database connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Missing environment variable: {0} (or DATABASE_URL)")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}
