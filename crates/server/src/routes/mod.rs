//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (database ping)
//!
//! # Auth (register/login rate limited)
//! POST /api/auth/register                   - Create account, sign in
//! POST /api/auth/login                      - Sign in
//! POST /api/auth/logout                     - Sign out
//! GET  /api/auth/me                         - Profile with balance
//! PUT  /api/account/payout                  - Set payout bank account
//!
//! # Products
//! GET  /api/products                        - Search available listings
//! POST /api/products                        - Create listing
//! GET  /api/products/{id}                   - Listing detail
//! PATCH /api/products/{id}                  - Update own listing
//! DELETE /api/products/{id}                 - Archive own listing
//! GET  /api/me/products                     - Own listings, any status
//!
//! # Wishlist
//! GET  /api/wishlist                        - Saved listings
//! POST /api/wishlist/{product_id}           - Save
//! DELETE /api/wishlist/{product_id}         - Unsave
//!
//! # Chat
//! GET  /api/conversations                   - Own conversations
//! POST /api/conversations                   - Open conversation about a product
//! GET  /api/conversations/{id}/messages     - Message history
//! POST /api/conversations/{id}/messages     - Send message
//! POST /api/conversations/{id}/read         - Mark counterpart's messages read
//!
//! # Notifications and realtime
//! GET  /api/notifications                   - Own notifications
//! POST /api/notifications/{id}/read         - Mark one read
//! POST /api/notifications/read-all          - Mark all read
//! GET  /api/events                          - SSE stream of own events
//!
//! # Payments
//! POST /api/transactions                    - Start Midtrans checkout
//! GET  /api/transactions                    - Purchases or sales
//! GET  /api/transactions/{order_id}         - Transaction detail
//! POST /api/transactions/{order_id}/sync    - Re-read status from Midtrans
//!
//! # Webhooks (no session, authenticated by signature/token)
//! POST /api/webhooks/midtrans
//! POST /api/webhooks/flip
//! POST /api/webhooks/xendit
//!
//! # Wallet
//! GET  /api/wallet                          - Balance
//! GET  /api/withdrawals                     - Own withdrawals
//! POST /api/withdrawals                     - Request withdrawal
//!
//! # Admin
//! GET  /api/admin/withdrawals               - Review queue
//! POST /api/admin/withdrawals/{id}/approve  - Disburse
//! POST /api/admin/withdrawals/{id}/reject   - Reject and refund
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod chat;
pub mod events;
pub mod health;
pub mod notifications;
pub mod products;
pub mod transactions;
pub mod webhooks;
pub mod wishlist;
pub mod withdrawals;

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, Request, Response, header},
    middleware,
    routing::{get, post, put},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::config::ServerConfig;
use crate::middleware::{auth_rate_limiter, create_session_layer, request_id_middleware};
use crate::state::AppState;

/// Body returned by endpoints that only acknowledge.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

impl Ack {
    pub const OK: Self = Self { status: "ok" };
}

/// Count of rows a bulk update touched.
#[derive(Debug, Serialize)]
pub struct Marked {
    pub marked: u64,
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(auth_rate_limiter())
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .patch(products::update)
                .delete(products::archive),
        )
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::index))
        .route(
            "/{product_id}",
            post(wishlist::add).delete(wishlist::remove),
        )
}

/// Create the chat routes router.
pub fn conversation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(chat::index).post(chat::open))
        .route("/{id}/messages", get(chat::messages).post(chat::send))
        .route("/{id}/read", post(chat::mark_read))
}

/// Create the notification routes router.
pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::index))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/{id}/read", post(notifications::mark_read))
}

/// Create the transaction routes router.
pub fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(transactions::index).post(transactions::create))
        .route("/{order_id}", get(transactions::show))
        .route("/{order_id}/sync", post(transactions::sync))
}

/// Create the gateway webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/midtrans", post(webhooks::midtrans))
        .route("/flip", post(webhooks::flip))
        .route("/xendit", post(webhooks::xendit))
}

/// Create the withdrawal routes router.
pub fn withdrawal_routes() -> Router<AppState> {
    Router::new().route("/", get(withdrawals::index).post(withdrawals::create))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/withdrawals", get(admin::withdrawals))
        .route("/withdrawals/{id}/approve", post(admin::approve))
        .route("/withdrawals/{id}/reject", post(admin::reject))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth_routes())
        .route("/api/account/payout", put(account::update_payout))
        .nest("/api/products", product_routes())
        .route("/api/me/products", get(products::mine))
        .nest("/api/wishlist", wishlist_routes())
        .nest("/api/conversations", conversation_routes())
        .nest("/api/notifications", notification_routes())
        .route("/api/events", get(events::stream))
        .nest("/api/transactions", transaction_routes())
        .nest("/api/webhooks", webhook_routes())
        .route("/api/wallet", get(withdrawals::wallet))
        .nest("/api/withdrawals", withdrawal_routes())
        .nest("/api/admin", admin_routes())
}

/// Build the full application: routes, health checks and middleware.
///
/// Sentry layers are added by the binary so tests can build the app without
/// a Sentry client.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.pool(), state.config());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(routes())
        .layer(session_layer)
        .layer(cors_layer(state.config()))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
}

/// CORS for the frontend served from the base URL.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(&config.base_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, "Base URL is not a valid origin; CORS disabled");
            layer
        }
    }
}
