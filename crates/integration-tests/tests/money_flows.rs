//! Balance and status invariants of payments and withdrawals.
//!
//! Each test gets a fresh database with the server migrations applied.
//! Run with `DATABASE_URL` pointing at a Postgres server:
//!
//! ```bash
//! cargo test -p unimarket-integration-tests --test money_flows -- --ignored
//! ```

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use sqlx::PgPool;

use unimarket_core::{
    DisbursementProvider, Email, ProductCondition, ProductStatus, Rupiah, TransactionStatus,
    UserId, WithdrawalStatus,
};
use unimarket_integration_tests::{UNREACHABLE_URL, test_config};
use unimarket_server::db::users::NewUser;
use unimarket_server::db::{
    ProductRepository, TransactionRepository, UserRepository, WithdrawalRepository,
};
use unimarket_server::error::AppError;
use unimarket_server::gateways::flip::FlipDisbursement;
use unimarket_server::gateways::midtrans::MidtransTransaction;
use unimarket_server::gateways::{
    DisbursementGateway, DisbursementReceipt, DisbursementRequest, GatewayError,
};
use unimarket_server::models::{
    NewProduct, NewTransaction, PayoutAccount, Product, Transaction, User,
};
use unimarket_server::services::payouts::{PayoutError, PayoutService};
use unimarket_server::services::realtime::RealtimeHub;
use unimarket_server::services::reconciliation::{Outcome, Reconciler};
use unimarket_server::state::AppState;

const PRICE: i64 = 100_000;
const FEE: i64 = 5_000;
const NET: i64 = PRICE - FEE;

// ============================================================================
// Fixtures
// ============================================================================

async fn user(pool: &PgPool, email: &str) -> User {
    UserRepository::new(pool)
        .create_with_password(
            &NewUser {
                email: Email::parse(email).unwrap(),
                name: email.split('@').next().unwrap().to_string(),
                phone: None,
            },
            "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g",
        )
        .await
        .unwrap()
}

async fn seller_with_account(pool: &PgPool) -> User {
    let seller = user(pool, "rina@ui.ac.id").await;
    UserRepository::new(pool)
        .update_payout_account(
            seller.id,
            &PayoutAccount {
                bank_code: "bca".to_string(),
                account_number: "1234567890".to_string(),
                account_holder: "Rina Kartika".to_string(),
            },
        )
        .await
        .unwrap()
}

async fn listing(pool: &PgPool, seller: UserId) -> Product {
    ProductRepository::new(pool)
        .create(
            seller,
            &NewProduct {
                title: "Kalkulus Purcell Edisi 9".to_string(),
                description: String::new(),
                price: Rupiah::new(PRICE),
                category: "books".to_string(),
                condition: ProductCondition::Used,
                image_urls: Vec::new(),
            },
        )
        .await
        .unwrap()
}

async fn checkout(pool: &PgPool, order_id: &str, buyer: UserId, product: &Product) -> Transaction {
    TransactionRepository::new(pool)
        .create(&NewTransaction {
            order_id: order_id.to_string(),
            buyer_id: buyer,
            seller_id: product.seller_id,
            product_id: product.id,
            amount: Rupiah::new(PRICE),
            platform_fee: Rupiah::new(FEE),
        })
        .await
        .unwrap()
}

async fn set_balance(pool: &PgPool, id: UserId, amount: i64) {
    sqlx::query("UPDATE users SET balance = $2 WHERE id = $1")
        .bind(id)
        .bind(Rupiah::new(amount))
        .execute(pool)
        .await
        .unwrap();
}

async fn balance(pool: &PgPool, id: UserId) -> Rupiah {
    UserRepository::new(pool).balance(id).await.unwrap()
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
}

async fn transaction_status(pool: &PgPool, order_id: &str) -> TransactionStatus {
    TransactionRepository::new(pool)
        .get_by_order_id(order_id)
        .await
        .unwrap()
        .unwrap()
        .status
}

fn state(pool: &PgPool) -> AppState {
    AppState::new(test_config(UNREACHABLE_URL), pool.clone()).unwrap()
}

fn settlement(order_id: &str) -> MidtransTransaction {
    serde_json::from_value(json!({
        "order_id": order_id,
        "status_code": "200",
        "gross_amount": "100000.00",
        "transaction_status": "settlement",
        "fraud_status": "accept",
        "payment_type": "bank_transfer",
        "transaction_id": "9aed5972-5b6a-401e-894b-a32c91ed1a3a"
    }))
    .unwrap()
}

/// Disbursement gateway that answers with a fixed result.
struct ScriptedGateway {
    answer: fn() -> Result<DisbursementReceipt, GatewayError>,
}

impl DisbursementGateway for ScriptedGateway {
    fn provider(&self) -> DisbursementProvider {
        DisbursementProvider::Flip
    }

    async fn disburse(
        &self,
        _request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, GatewayError> {
        (self.answer)()
    }
}

fn queued() -> Result<DisbursementReceipt, GatewayError> {
    Ok(DisbursementReceipt {
        provider_id: "9910".to_string(),
        status: WithdrawalStatus::Processing,
    })
}

fn refused() -> Result<DisbursementReceipt, GatewayError> {
    Err(GatewayError::Api {
        provider: "flip",
        status: 422,
        message: "Account number is invalid".to_string(),
    })
}

fn unmapped_status() -> Result<DisbursementReceipt, GatewayError> {
    Err(GatewayError::Accepted {
        provider: "flip",
        provider_id: "9911".to_string(),
        status: "QUEUED".to_string(),
    })
}

// ============================================================================
// Payment settlement
// ============================================================================

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_settlement_sells_product_and_credits_seller(pool: PgPool) {
    let seller = user(&pool, "rina@ui.ac.id").await;
    let first = user(&pool, "budi@ui.ac.id").await;
    let second = user(&pool, "sari@ui.ac.id").await;
    let product = listing(&pool, seller.id).await;
    checkout(&pool, "UM-1-aaaa", first.id, &product).await;
    checkout(&pool, "UM-1-bbbb", second.id, &product).await;

    let state = state(&pool);
    let outcome = Reconciler::new(&state)
        .apply_midtrans(&settlement("UM-1-aaaa"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Applied);
    assert_eq!(transaction_status(&pool, "UM-1-aaaa").await, TransactionStatus::Paid);
    assert_eq!(
        transaction_status(&pool, "UM-1-bbbb").await,
        TransactionStatus::Cancelled
    );
    let product = ProductRepository::new(&pool).get(product.id).await.unwrap().unwrap();
    assert_eq!(product.status, ProductStatus::Sold);
    assert_eq!(balance(&pool, seller.id).await, Rupiah::new(NET));
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_duplicate_settlement_is_noop(pool: PgPool) {
    let seller = user(&pool, "rina@ui.ac.id").await;
    let buyer = user(&pool, "budi@ui.ac.id").await;
    let product = listing(&pool, seller.id).await;
    checkout(&pool, "UM-1-aaaa", buyer.id, &product).await;

    let state = state(&pool);
    let reconciler = Reconciler::new(&state);
    let notification = settlement("UM-1-aaaa");

    assert_eq!(
        reconciler.apply_midtrans(&notification).await.unwrap(),
        Outcome::Applied
    );
    assert_eq!(
        reconciler.apply_midtrans(&notification).await.unwrap(),
        Outcome::Unchanged
    );

    assert_eq!(balance(&pool, seller.id).await, Rupiah::new(NET));
    assert_eq!(
        count(&pool, "SELECT count(*) FROM notifications WHERE kind = 'payment_paid'").await,
        1
    );
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_settlement_on_cancelled_checkout_changes_nothing(pool: PgPool) {
    let seller = user(&pool, "rina@ui.ac.id").await;
    let first = user(&pool, "budi@ui.ac.id").await;
    let second = user(&pool, "sari@ui.ac.id").await;
    let product = listing(&pool, seller.id).await;
    checkout(&pool, "UM-1-aaaa", first.id, &product).await;
    checkout(&pool, "UM-1-bbbb", second.id, &product).await;

    let state = state(&pool);
    let reconciler = Reconciler::new(&state);
    reconciler
        .apply_midtrans(&settlement("UM-1-aaaa"))
        .await
        .unwrap();

    let outcome = reconciler
        .apply_midtrans(&settlement("UM-1-bbbb"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Unchanged);
    assert_eq!(
        transaction_status(&pool, "UM-1-bbbb").await,
        TransactionStatus::Cancelled
    );
    assert_eq!(balance(&pool, seller.id).await, Rupiah::new(NET));
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_refund_never_overdraws_seller(pool: PgPool) {
    let seller = seller_with_account(&pool).await;
    let buyer = user(&pool, "budi@ui.ac.id").await;
    let product = listing(&pool, seller.id).await;
    checkout(&pool, "UM-1-aaaa", buyer.id, &product).await;

    let state = state(&pool);
    Reconciler::new(&state)
        .apply_midtrans(&settlement("UM-1-aaaa"))
        .await
        .unwrap();

    // Seller withdraws most of the sale before the refund arrives
    let hub = RealtimeHub::new();
    PayoutService::new(&pool, &hub, DisbursementProvider::Flip)
        .request_withdrawal(seller.id, Rupiah::new(60_000))
        .await
        .unwrap();
    assert_eq!(balance(&pool, seller.id).await, Rupiah::new(NET - 60_000));

    let refunded = TransactionRepository::new(&pool)
        .refund("UM-1-aaaa", &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(refunded.transaction.status, TransactionStatus::Refunded);
    assert_eq!(refunded.shortfall, Rupiah::new(60_000));
    assert_eq!(balance(&pool, seller.id).await, Rupiah::ZERO);
    let product = ProductRepository::new(&pool).get(product.id).await.unwrap().unwrap();
    assert_eq!(product.status, ProductStatus::Available);

    // Already refunded
    assert!(
        TransactionRepository::new(&pool)
            .refund("UM-1-aaaa", &[])
            .await
            .unwrap()
            .is_none()
    );
}

// ============================================================================
// Withdrawals
// ============================================================================

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_withdrawal_beyond_balance_writes_nothing(pool: PgPool) {
    let seller = seller_with_account(&pool).await;
    set_balance(&pool, seller.id, 20_000).await;

    let hub = RealtimeHub::new();
    let err = PayoutService::new(&pool, &hub, DisbursementProvider::Flip)
        .request_withdrawal(seller.id, Rupiah::new(50_000))
        .await
        .unwrap_err();

    assert!(matches!(err, PayoutError::InsufficientBalance), "{err:?}");
    assert_eq!(AppError::from(err).into_response().status(), StatusCode::CONFLICT);
    assert_eq!(balance(&pool, seller.id).await, Rupiah::new(20_000));
    assert_eq!(count(&pool, "SELECT count(*) FROM withdrawals").await, 0);
    assert_eq!(count(&pool, "SELECT count(*) FROM notifications").await, 0);
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_refused_disbursement_rejects_and_refunds(pool: PgPool) {
    let seller = seller_with_account(&pool).await;
    let admin = user(&pool, "admin@ui.ac.id").await;
    set_balance(&pool, seller.id, 50_000).await;

    let hub = RealtimeHub::new();
    let payouts = PayoutService::new(&pool, &hub, DisbursementProvider::Flip);
    let requested = payouts
        .request_withdrawal(seller.id, Rupiah::new(50_000))
        .await
        .unwrap();
    assert_eq!(balance(&pool, seller.id).await, Rupiah::ZERO);

    let err = payouts
        .approve(&ScriptedGateway { answer: refused }, requested.id, admin.id)
        .await
        .unwrap_err();

    let PayoutError::Gateway { withdrawal, .. } = &err else {
        panic!("expected a gateway error, got {err:?}");
    };
    assert_eq!(withdrawal.status, WithdrawalStatus::Rejected);
    assert!(
        withdrawal
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("Account number is invalid"))
    );
    assert_eq!(balance(&pool, seller.id).await, Rupiah::new(50_000));
    assert_eq!(
        AppError::from(err).into_response().status(),
        StatusCode::BAD_GATEWAY
    );
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_unmapped_disbursement_waits_for_callback(pool: PgPool) {
    let seller = seller_with_account(&pool).await;
    let admin = user(&pool, "admin@ui.ac.id").await;
    set_balance(&pool, seller.id, 50_000).await;

    let hub = RealtimeHub::new();
    let payouts = PayoutService::new(&pool, &hub, DisbursementProvider::Flip);
    let requested = payouts
        .request_withdrawal(seller.id, Rupiah::new(50_000))
        .await
        .unwrap();

    let withdrawal = payouts
        .approve(&ScriptedGateway { answer: unmapped_status }, requested.id, admin.id)
        .await
        .unwrap();

    assert_eq!(withdrawal.status, WithdrawalStatus::Processing);
    assert_eq!(withdrawal.provider_id.as_deref(), Some("9911"));
    assert_eq!(balance(&pool, seller.id).await, Rupiah::ZERO);

    // Flip reports the payout it had already accepted
    let state = state(&pool);
    let outcome = Reconciler::new(&state)
        .apply_flip(&FlipDisbursement {
            id: "9911".to_string(),
            status: "DONE".to_string(),
            reason: None,
            idempotency_key: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Applied);
    let completed = WithdrawalRepository::new(&pool)
        .get(requested.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.status, WithdrawalStatus::Completed);
    assert_eq!(balance(&pool, seller.id).await, Rupiah::ZERO);
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_approve_only_once(pool: PgPool) {
    let seller = seller_with_account(&pool).await;
    let admin = user(&pool, "admin@ui.ac.id").await;
    set_balance(&pool, seller.id, 50_000).await;

    let hub = RealtimeHub::new();
    let payouts = PayoutService::new(&pool, &hub, DisbursementProvider::Flip);
    let requested = payouts
        .request_withdrawal(seller.id, Rupiah::new(50_000))
        .await
        .unwrap();

    let gateway = ScriptedGateway { answer: queued };
    let first = payouts.approve(&gateway, requested.id, admin.id).await.unwrap();
    assert_eq!(first.status, WithdrawalStatus::Processing);
    assert_eq!(first.provider_id.as_deref(), Some("9910"));

    let err = payouts
        .approve(&gateway, requested.id, admin.id)
        .await
        .unwrap_err();
    assert!(
        matches!(err, PayoutError::NotPending(WithdrawalStatus::Processing)),
        "{err:?}"
    );
}

#[sqlx::test(migrations = "../server/migrations")]
#[ignore = "Requires a Postgres database (DATABASE_URL)"]
async fn test_auto_payout_disburses_net_amount(pool: PgPool) {
    let seller = seller_with_account(&pool).await;
    let buyer = user(&pool, "budi@ui.ac.id").await;
    let product = listing(&pool, seller.id).await;
    checkout(&pool, "UM-1-aaaa", buyer.id, &product).await;

    let state = state(&pool);
    Reconciler::new(&state)
        .apply_midtrans(&settlement("UM-1-aaaa"))
        .await
        .unwrap();
    let paid = TransactionRepository::new(&pool)
        .get_by_order_id("UM-1-aaaa")
        .await
        .unwrap()
        .unwrap();

    let hub = RealtimeHub::new();
    let withdrawal = PayoutService::new(&pool, &hub, DisbursementProvider::Flip)
        .auto_payout(&ScriptedGateway { answer: queued }, &paid)
        .await
        .unwrap();

    assert_eq!(withdrawal.amount, Rupiah::new(NET));
    assert_eq!(withdrawal.status, WithdrawalStatus::Processing);
    assert_eq!(withdrawal.source_transaction_id, Some(paid.id));
    assert_eq!(balance(&pool, seller.id).await, Rupiah::ZERO);
}
