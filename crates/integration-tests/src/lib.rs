//! Integration tests for Unimarket.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p unimarket-integration-tests
//! ```
//!
//! Only `money_flows` needs a database; its tests are ignored by default and
//! run with `-- --ignored` against `DATABASE_URL`. Everything else builds the
//! router on a lazily connecting pool, so any test that reaches the database
//! fails loudly instead of hanging. Gateway clients are pointed at axum
//! servers bound to `127.0.0.1:0`.
//!
//! # Test Categories
//!
//! - `webhooks` - Callback authentication and routing through the full app
//! - `gateway_clients` - Midtrans, Flip and Xendit request shapes and responses
//! - `money_flows` - Settlement, refund and withdrawal balance invariants

use std::time::Duration;

use axum::Router;
use secrecy::SecretString;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use unimarket_server::config::{
    FlipConfig, MidtransConfig, PayoutConfig, ServerConfig, XenditConfig,
};
use unimarket_server::routes;
use unimarket_server::state::AppState;

pub const MIDTRANS_SERVER_KEY: &str = "SB-Mid-server-Tq7u2Zk9LpWc";
pub const FLIP_SECRET_KEY: &str = "JDJ5JDEzJHRlc3QtZmxpcC1rZXk";
pub const FLIP_VALIDATION_TOKEN: &str = "$2y$13$flip.validation.token";
pub const XENDIT_SECRET_KEY: &str = "xnd_development_Q9w8E7r6T5y4";
pub const XENDIT_CALLBACK_TOKEN: &str = "xnd_cb_Z1x2C3v4B5n6";

/// Nothing listens here; used where a URL is required but never called.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

/// Server configuration with every gateway pointed at `gateway_url`.
#[must_use]
pub fn test_config(gateway_url: &str) -> ServerConfig {
    ServerConfig {
        database_url: SecretString::from("postgres://unimarket@127.0.0.1:1/unimarket"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 0,
        base_url: "http://localhost:5173".to_string(),
        midtrans: midtrans_config(gateway_url),
        flip: flip_config(gateway_url),
        xendit: xendit_config(gateway_url),
        payouts: PayoutConfig::default(),
        allowed_email_domains: vec!["ui.ac.id".to_string()],
        sentry_dsn: None,
        sentry_environment: None,
    }
}

#[must_use]
pub fn midtrans_config(url: &str) -> MidtransConfig {
    MidtransConfig {
        server_key: SecretString::from(MIDTRANS_SERVER_KEY),
        is_production: false,
        snap_url: url.to_string(),
        api_url: url.to_string(),
    }
}

#[must_use]
pub fn flip_config(url: &str) -> FlipConfig {
    FlipConfig {
        secret_key: SecretString::from(FLIP_SECRET_KEY),
        validation_token: SecretString::from(FLIP_VALIDATION_TOKEN),
        api_url: url.to_string(),
    }
}

#[must_use]
pub fn xendit_config(url: &str) -> XenditConfig {
    XenditConfig {
        secret_key: SecretString::from(XENDIT_SECRET_KEY),
        callback_token: SecretString::from(XENDIT_CALLBACK_TOKEN),
        api_url: url.to_string(),
    }
}

/// A pool that only connects when a query runs, and gives up quickly.
///
/// # Panics
///
/// Panics if the hard-coded connection string does not parse.
#[must_use]
pub fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy("postgres://unimarket@127.0.0.1:1/unimarket")
        .expect("static connection string parses")
}

/// Application state built from [`test_config`] on a [`lazy_pool`].
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn test_state(gateway_url: &str) -> AppState {
    AppState::new(test_config(gateway_url), lazy_pool()).expect("HTTP client builds")
}

/// The full application router, gateways unreachable.
#[must_use]
pub fn test_app() -> Router {
    routes::app(test_state(UNREACHABLE_URL))
}

/// Serve `router` on an ephemeral local port and return its base URL.
///
/// # Panics
///
/// Panics if no local port can be bound.
pub async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}
