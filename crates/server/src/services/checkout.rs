//! Buyer checkout through Midtrans Snap.

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use unimarket_core::{ProductId, ProductStatus, UserId};

use crate::db::{ProductRepository, RepositoryError, TransactionRepository, UserRepository};
use crate::gateways::GatewayError;
use crate::gateways::midtrans::{
    CustomerDetails, ItemDetail, MidtransClient, SnapCallbacks, SnapRequest, TransactionDetails,
};
use crate::models::{NewTransaction, Product, Transaction, User};

/// Errors from creating a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("product not found")]
    ProductNotFound,

    #[error("product is no longer available")]
    ProductUnavailable,

    #[error("you cannot buy your own product")]
    OwnProduct,

    /// Midtrans refused or could not be reached; the transaction was marked
    /// `failed`.
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Creates pending transactions and their Snap checkouts.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    midtrans: &'a MidtransClient,
    base_url: &'a str,
    platform_fee_percent: Decimal,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        midtrans: &'a MidtransClient,
        base_url: &'a str,
        platform_fee_percent: Decimal,
    ) -> Self {
        Self {
            pool,
            midtrans,
            base_url,
            platform_fee_percent,
        }
    }

    /// Start (or resume) a checkout of `product_id` by `buyer_id`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductUnavailable` unless the product is
    /// `available`, `CheckoutError::OwnProduct` when the buyer is the seller,
    /// and `CheckoutError::Gateway` when Snap fails.
    #[instrument(skip(self), fields(order_id = tracing::field::Empty))]
    pub async fn create(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
    ) -> Result<Transaction, CheckoutError> {
        let product = ProductRepository::new(self.pool)
            .get(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound)?;

        if product.seller_id == buyer_id {
            return Err(CheckoutError::OwnProduct);
        }
        if product.status != ProductStatus::Available {
            return Err(CheckoutError::ProductUnavailable);
        }

        let transactions = TransactionRepository::new(self.pool);
        if let Some(existing) = transactions.find_reusable(buyer_id, product_id).await? {
            tracing::Span::current().record("order_id", existing.order_id.as_str());
            info!("Reusing pending checkout");
            return Ok(existing);
        }

        let buyer = UserRepository::new(self.pool)
            .get_by_id(buyer_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let order_id = new_order_id(product_id);
        tracing::Span::current().record("order_id", order_id.as_str());

        let transaction = transactions
            .create(&NewTransaction {
                order_id: order_id.clone(),
                buyer_id,
                seller_id: product.seller_id,
                product_id,
                amount: product.price,
                platform_fee: product.price.percent(self.platform_fee_percent),
            })
            .await?;

        let request = self.snap_request(&transaction, &product, &buyer);
        match self.midtrans.create_snap_transaction(&request).await {
            Ok(snap) => {
                let transaction = transactions
                    .attach_snap(&order_id, &snap.token, &snap.redirect_url)
                    .await?;
                info!(amount = %transaction.amount, "Checkout created");
                Ok(transaction)
            }
            Err(e) => {
                warn!(error = %e, "Snap checkout failed; marking transaction failed");
                transactions.mark_failed(&order_id).await?;
                Err(CheckoutError::Gateway(e))
            }
        }
    }

    fn snap_request(&self, transaction: &Transaction, product: &Product, buyer: &User) -> SnapRequest {
        SnapRequest {
            transaction_details: TransactionDetails {
                order_id: transaction.order_id.clone(),
                gross_amount: transaction.amount.as_i64(),
            },
            item_details: vec![ItemDetail::single(
                product.id.to_string(),
                product.price.as_i64(),
                &product.title,
            )],
            customer_details: CustomerDetails {
                first_name: buyer.name.clone(),
                email: buyer.email.to_string(),
                phone: buyer.phone.clone(),
            },
            callbacks: Some(SnapCallbacks {
                finish: format!("{}/transactions/{}", self.base_url, transaction.order_id),
            }),
        }
    }
}

/// `UM-<product id>-<12 hex chars>`.
fn new_order_id(product_id: ProductId) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let suffix: String = random.chars().take(12).collect();
    format!("UM-{product_id}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_format() {
        let order_id = new_order_id(ProductId::new(42));
        let suffix = order_id.strip_prefix("UM-42-").unwrap_or_default();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_order_ids_are_unique() {
        assert_ne!(
            new_order_id(ProductId::new(1)),
            new_order_id(ProductId::new(1))
        );
    }
}
