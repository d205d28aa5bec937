//! Buyer payment transactions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use unimarket_core::{ProductId, Rupiah, TransactionId, TransactionStatus, UserId};

/// A Midtrans checkout for one product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    /// Gateway-facing order id (`UM-<product>-<hex>`).
    pub order_id: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub amount: Rupiah,
    pub platform_fee: Rupiah,
    pub status: TransactionStatus,
    pub payment_type: Option<String>,
    pub snap_token: Option<String>,
    pub redirect_url: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Amount credited to the seller once paid.
    #[must_use]
    pub fn net_amount(&self) -> Rupiah {
        self.amount
            .checked_sub(self.platform_fee)
            .unwrap_or(Rupiah::ZERO)
    }

    /// Whether `user` bought or sold in this transaction.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }
}

/// A transaction about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_id: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub amount: Rupiah,
    pub platform_fee: Rupiah,
}

/// Payment details reported by the gateway when a transaction settles.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    pub payment_type: Option<String>,
    pub gateway_transaction_id: Option<String>,
}
