//! Gateway clients against local mock servers.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use uuid::Uuid;

use unimarket_core::{DisbursementProvider, Rupiah, WithdrawalStatus};
use unimarket_integration_tests::{
    flip_config, midtrans_config, spawn_mock, test_state, xendit_config,
};
use unimarket_server::gateways::midtrans::{
    CustomerDetails, ItemDetail, SnapCallbacks, SnapRequest, TransactionDetails, signature_key,
};
use unimarket_server::gateways::{
    DisbursementGateway, DisbursementRequest, FlipClient, GatewayError, MidtransClient,
    XenditClient, http_client,
};
use unimarket_server::models::PayoutAccount;

/// What a mock endpoint received.
#[derive(Debug, Default, Clone)]
struct Captured {
    headers: HashMap<String, String>,
    body: Value,
}

type Capture = Arc<Mutex<Option<Captured>>>;

fn capture(headers: &HeaderMap, body: Value) -> Captured {
    Captured {
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body,
    }
}

fn disbursement_request() -> DisbursementRequest {
    DisbursementRequest {
        reference: Uuid::parse_str("3f2b8d2e-5f0e-4f51-9c53-1f1b5b0b1a11").unwrap(),
        amount: Rupiah::new(150_000),
        account: PayoutAccount {
            bank_code: "bca".to_string(),
            account_number: "1234567890".to_string(),
            account_holder: "Siti Rahma".to_string(),
        },
        remark: "Unimarket withdrawal payout".to_string(),
    }
}

fn snap_request() -> SnapRequest {
    SnapRequest {
        transaction_details: TransactionDetails {
            order_id: "UM-42-0a1b2c3d4e5f".to_string(),
            gross_amount: 150_000,
        },
        item_details: vec![ItemDetail::single("42", 150_000, "Kalkulator Casio fx-991ID")],
        customer_details: CustomerDetails {
            first_name: "Budi".to_string(),
            email: "budi@ui.ac.id".to_string(),
            phone: None,
        },
        callbacks: Some(SnapCallbacks {
            finish: "http://localhost:5173/transactions/UM-42-0a1b2c3d4e5f".to_string(),
        }),
    }
}

// ============================================================================
// Midtrans
// ============================================================================

#[tokio::test]
async fn test_snap_transaction_request_shape() {
    let seen: Capture = Arc::default();
    let app = Router::new()
        .route(
            "/snap/v1/transactions",
            post(|State(seen): State<Capture>, headers: HeaderMap, Json(body): Json<Value>| async move {
                *seen.lock().unwrap() = Some(capture(&headers, body));
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "token": "66e4fa55-fdac-4ef9-91b5-733b97d1b862",
                        "redirect_url": "https://app.sandbox.midtrans.com/snap/v4/redirection/66e4fa55-fdac-4ef9-91b5-733b97d1b862"
                    })),
                )
            }),
        )
        .with_state(Arc::clone(&seen));
    let url = spawn_mock(app).await;

    let client = MidtransClient::new(http_client().unwrap(), &midtrans_config(&url));
    let snap = client.create_snap_transaction(&snap_request()).await.unwrap();

    assert_eq!(snap.token, "66e4fa55-fdac-4ef9-91b5-733b97d1b862");
    assert!(snap.redirect_url.ends_with(&snap.token));

    let seen = seen.lock().unwrap().clone().unwrap();
    assert!(seen.headers["authorization"].starts_with("Basic "));
    assert_eq!(seen.body["transaction_details"]["order_id"], "UM-42-0a1b2c3d4e5f");
    assert_eq!(seen.body["transaction_details"]["gross_amount"], 150_000);
    assert_eq!(seen.body["item_details"][0]["quantity"], 1);
    assert_eq!(seen.body["customer_details"]["email"], "budi@ui.ac.id");
    assert!(seen.body["customer_details"].get("phone").is_none());
}

#[tokio::test]
async fn test_snap_error_becomes_api_error() {
    let app = Router::new().route(
        "/snap/v1/transactions",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error_messages": ["transaction_details.order_id has already been taken"]})),
            )
        }),
    );
    let url = spawn_mock(app).await;

    let client = MidtransClient::new(http_client().unwrap(), &midtrans_config(&url));
    let err = client.create_snap_transaction(&snap_request()).await.unwrap_err();

    match err {
        GatewayError::Api { status, message, .. } => {
            assert_eq!(status, 400);
            assert!(message.contains("already been taken"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transaction_status_parses_settlement() {
    let app = Router::new().route(
        "/v2/{order_id}/status",
        get(|Path(order_id): Path<String>| async move {
            let signature = signature_key(
                &order_id,
                "200",
                "150000.00",
                unimarket_integration_tests::MIDTRANS_SERVER_KEY,
            );
            Json(json!({
                "status_code": "200",
                "status_message": "Success, transaction is found",
                "transaction_id": "0b3e4f1a-7c5d-4e0b-9a27-6f1d2c3b4a59",
                "order_id": order_id,
                "gross_amount": "150000.00",
                "payment_type": "qris",
                "transaction_status": "settlement",
                "fraud_status": "accept",
                "signature_key": signature
            }))
        }),
    );
    let url = spawn_mock(app).await;

    let client = MidtransClient::new(http_client().unwrap(), &midtrans_config(&url));
    let status = client.transaction_status("UM-42-0a1b2c3d4e5f").await.unwrap();

    assert_eq!(status.order_id, "UM-42-0a1b2c3d4e5f");
    assert_eq!(status.transaction_status.as_deref(), Some("settlement"));
    assert_eq!(status.payment_type.as_deref(), Some("qris"));
    assert!(client.verify_notification_signature(&status));
}

#[tokio::test]
async fn test_transaction_status_unknown_order() {
    let app = Router::new().route(
        "/v2/{order_id}/status",
        get(|| async {
            Json(json!({
                "status_code": "404",
                "status_message": "Transaction doesn't exist."
            }))
        }),
    );
    let url = spawn_mock(app).await;

    let client = MidtransClient::new(http_client().unwrap(), &midtrans_config(&url));
    let err = client.transaction_status("UM-1-000000000000").await.unwrap_err();

    assert!(matches!(err, GatewayError::Api { status: 404, .. }), "{err:?}");
}

// ============================================================================
// Flip
// ============================================================================

#[tokio::test]
async fn test_flip_disbursement_request_shape() {
    let seen: Capture = Arc::default();
    let app = Router::new()
        .route(
            "/v3/disbursement",
            post(
                |State(seen): State<Capture>,
                 headers: HeaderMap,
                 Form(form): Form<HashMap<String, String>>| async move {
                    let idempotency_key = headers
                        .get("idempotency-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *seen.lock().unwrap() = Some(capture(&headers, json!(form)));
                    Json(json!({
                        "id": 98_765,
                        "user_id": 23,
                        "amount": 150_000,
                        "status": "PENDING",
                        "reason": "",
                        "timestamp": "2026-10-19 10:20:00",
                        "bank_code": "bca",
                        "account_number": "1234567890",
                        "recipient_name": "-",
                        "idempotency_key": idempotency_key
                    }))
                },
            ),
        )
        .with_state(Arc::clone(&seen));
    let url = spawn_mock(app).await;

    let client = FlipClient::new(http_client().unwrap(), &flip_config(&url));
    let receipt = client.disburse(&disbursement_request()).await.unwrap();

    assert_eq!(receipt.provider_id, "98765");
    assert_eq!(receipt.status, WithdrawalStatus::Processing);

    let seen = seen.lock().unwrap().clone().unwrap();
    assert!(seen.headers["authorization"].starts_with("Basic "));
    assert_eq!(
        seen.headers["idempotency-key"],
        "3f2b8d2e-5f0e-4f51-9c53-1f1b5b0b1a11"
    );
    assert!(seen.headers.contains_key("x-timestamp"));
    assert_eq!(seen.body["account_number"], "1234567890");
    assert_eq!(seen.body["bank_code"], "bca");
    assert_eq!(seen.body["amount"], "150000");
    assert!(seen.body["remark"].as_str().unwrap().chars().count() <= 18);
}

#[tokio::test]
async fn test_flip_validation_error() {
    let app = Router::new().route(
        "/v3/disbursement",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "code": "VALIDATION_ERROR",
                    "errors": [
                        {"attribute": "account_number", "code": 1024, "message": "Account number is invalid"}
                    ]
                })),
            )
        }),
    );
    let url = spawn_mock(app).await;

    let client = FlipClient::new(http_client().unwrap(), &flip_config(&url));
    let err = client.disburse(&disbursement_request()).await.unwrap_err();

    match err {
        GatewayError::Api { status, message, .. } => {
            assert_eq!(status, 422);
            assert_eq!(message, "Account number is invalid");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_flip_unknown_status_keeps_provider_id() {
    let app = Router::new().route(
        "/v3/disbursement",
        post(|| async { Json(json!({"id": 9911, "status": "QUEUED"})) }),
    );
    let url = spawn_mock(app).await;

    let client = FlipClient::new(http_client().unwrap(), &flip_config(&url));
    let err = client.disburse(&disbursement_request()).await.unwrap_err();

    assert!(!err.is_refusal(), "{err:?}");
    assert_eq!(err.provider_id(), Some("9911"));
}

#[tokio::test]
async fn test_flip_unreadable_success_is_not_a_refusal() {
    let app = Router::new().route("/v3/disbursement", post(|| async { "queued" }));
    let url = spawn_mock(app).await;

    let client = FlipClient::new(http_client().unwrap(), &flip_config(&url));
    let err = client.disburse(&disbursement_request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Decode { .. }), "{err:?}");
    assert!(!err.is_refusal());
}

// ============================================================================
// Xendit
// ============================================================================

#[tokio::test]
async fn test_xendit_disbursement_request_shape() {
    let seen: Capture = Arc::default();
    let app = Router::new()
        .route(
            "/disbursements",
            post(|State(seen): State<Capture>, headers: HeaderMap, Json(body): Json<Value>| async move {
                let external_id = body["external_id"].clone();
                *seen.lock().unwrap() = Some(capture(&headers, body));
                Json(json!({
                    "id": "57f1ce05bb1a631a65eee662",
                    "user_id": "5785e6334d7b410667d355c4",
                    "external_id": external_id,
                    "amount": 150_000,
                    "bank_code": "BCA",
                    "account_holder_name": "SITI RAHMA",
                    "disbursement_description": "Unimarket withdrawal payout",
                    "status": "PENDING"
                }))
            }),
        )
        .with_state(Arc::clone(&seen));
    let url = spawn_mock(app).await;

    let client = XenditClient::new(http_client().unwrap(), &xendit_config(&url));
    let receipt = client.disburse(&disbursement_request()).await.unwrap();

    assert_eq!(receipt.provider_id, "57f1ce05bb1a631a65eee662");
    assert_eq!(receipt.status, WithdrawalStatus::Processing);

    let seen = seen.lock().unwrap().clone().unwrap();
    assert!(seen.headers["authorization"].starts_with("Basic "));
    assert_eq!(
        seen.headers["x-idempotency-key"],
        "3f2b8d2e-5f0e-4f51-9c53-1f1b5b0b1a11"
    );
    assert_eq!(seen.body["external_id"], "3f2b8d2e-5f0e-4f51-9c53-1f1b5b0b1a11");
    assert_eq!(seen.body["bank_code"], "BCA");
    assert_eq!(seen.body["amount"], 150_000);
    assert_eq!(seen.body["account_holder_name"], "Siti Rahma");
}

#[tokio::test]
async fn test_xendit_error_message() {
    let app = Router::new().route(
        "/disbursements",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error_code": "INSUFFICIENT_BALANCE",
                    "message": "Balance is insufficient for this disbursement"
                })),
            )
        }),
    );
    let url = spawn_mock(app).await;

    let client = XenditClient::new(http_client().unwrap(), &xendit_config(&url));
    let err = client.disburse(&disbursement_request()).await.unwrap_err();

    match err {
        GatewayError::Api { status, message, .. } => {
            assert_eq!(status, 400);
            assert!(message.contains("insufficient"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_xendit_unknown_status_keeps_provider_id() {
    let app = Router::new().route(
        "/disbursements",
        post(|| async {
            Json(json!({
                "id": "57f1ce05bb1a631a65eee663",
                "external_id": "3f2b8d2e-5f0e-4f51-9c53-1f1b5b0b1a11",
                "status": "ON_HOLD"
            }))
        }),
    );
    let url = spawn_mock(app).await;

    let client = XenditClient::new(http_client().unwrap(), &xendit_config(&url));
    let err = client.disburse(&disbursement_request()).await.unwrap_err();

    assert!(!err.is_refusal(), "{err:?}");
    assert_eq!(err.provider_id(), Some("57f1ce05bb1a631a65eee663"));
}

// ============================================================================
// Provider selection
// ============================================================================

#[tokio::test]
async fn test_state_picks_disburser_by_provider() {
    let state = test_state(unimarket_integration_tests::UNREACHABLE_URL);
    assert_eq!(
        state.disburser(DisbursementProvider::Flip).provider(),
        DisbursementProvider::Flip
    );
    assert_eq!(
        state.disburser(DisbursementProvider::Xendit).provider(),
        DisbursementProvider::Xendit
    );
}

#[tokio::test]
async fn test_unreachable_gateway_is_http_error() {
    let state = test_state(unimarket_integration_tests::UNREACHABLE_URL);
    let err = state
        .disburser(DisbursementProvider::Xendit)
        .disburse(&disbursement_request())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Http { .. }), "{err:?}");
    assert!(!err.is_refusal());
}
