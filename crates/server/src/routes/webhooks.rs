//! Gateway callbacks.
//!
//! These routes carry no session. Each delivery is authenticated before any
//! database access: Midtrans by the `signature_key` in the body, Flip by the
//! validation token in the form, Xendit by the `x-callback-token` header.
//! Processed, duplicate and ignored deliveries all get `200 {"status":"ok"}`
//! so the gateway stops retrying.

use axum::{
    Form, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::gateways::flip::FlipCallbackForm;
use crate::gateways::midtrans::MidtransTransaction;
use crate::gateways::xendit::XenditDisbursement;
use crate::routes::Ack;
use crate::services::reconciliation::{Reconciler, WebhookError};
use crate::state::AppState;

/// Header Xendit puts its callback verification token in.
pub const XENDIT_TOKEN_HEADER: &str = "x-callback-token";

/// Midtrans payment notification.
#[instrument(skip_all)]
pub async fn midtrans(State(state): State<AppState>, body: Bytes) -> Result<Json<Ack>, AppError> {
    let notification: MidtransTransaction = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::Malformed(e.to_string()))?;

    if !state.midtrans().verify_notification_signature(&notification) {
        warn!(order_id = %notification.order_id, "Midtrans signature mismatch");
        return Err(WebhookError::InvalidSignature.into());
    }

    let outcome = Reconciler::new(&state).apply_midtrans(&notification).await?;
    info!(order_id = %notification.order_id, ?outcome, "Midtrans notification handled");
    Ok(Json(Ack::OK))
}

/// Flip disbursement callback.
#[instrument(skip_all)]
pub async fn flip(
    State(state): State<AppState>,
    Form(form): Form<FlipCallbackForm>,
) -> Result<Json<Ack>, AppError> {
    if !state.flip().verify_callback_token(&form.token) {
        warn!("Flip callback token mismatch");
        return Err(WebhookError::InvalidToken.into());
    }

    let disbursement = form
        .disbursement()
        .map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let outcome = Reconciler::new(&state).apply_flip(&disbursement).await?;
    info!(provider_id = %disbursement.id, ?outcome, "Flip callback handled");
    Ok(Json(Ack::OK))
}

/// Xendit disbursement callback.
#[instrument(skip_all)]
pub async fn xendit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, AppError> {
    let token = headers
        .get(XENDIT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.xendit().verify_callback_token(token) {
        warn!("Xendit callback token mismatch");
        return Err(WebhookError::InvalidToken.into());
    }

    let disbursement: XenditDisbursement = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let outcome = Reconciler::new(&state).apply_xendit(&disbursement).await?;
    info!(external_id = %disbursement.external_id, ?outcome, "Xendit callback handled");
    Ok(Json(Ack::OK))
}
