//! Transaction repository.
//!
//! Every status change is a conditional `UPDATE ... WHERE status = ...`, so
//! two concurrent deliveries of the same webhook cannot both apply. Methods
//! that touch more than one table run inside a single database transaction
//! and return `None` when the guarded row had already moved on.

use sqlx::PgPool;

use unimarket_core::{ProductId, ProductStatus, Rupiah, TransactionStatus, UserId};

use super::RepositoryError;
use super::notifications::insert_with;
use crate::models::{NewNotification, NewTransaction, Notification, PaymentDetails, Transaction};

const TRANSACTION_COLUMNS: &str = "id, order_id, buyer_id, seller_id, product_id, amount, \
                                   platform_fee, status, payment_type, snap_token, redirect_url, \
                                   gateway_transaction_id, paid_at, created_at, updated_at";

/// Result of settling a payment.
#[derive(Debug)]
pub struct SettledPayment {
    pub transaction: Transaction,
    /// Order ids of other pending checkouts for the same product.
    pub cancelled_order_ids: Vec<String>,
    pub notifications: Vec<Notification>,
}

/// Result of refunding a settled payment.
#[derive(Debug)]
pub struct RefundedPayment {
    pub transaction: Transaction,
    /// Part of the seller's share that could not be taken back because it
    /// was already withdrawn.
    pub shortfall: Rupiah,
    pub notifications: Vec<Notification>,
}

/// Repository for buyer transactions.
pub struct TransactionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TransactionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a duplicate order id.
    pub async fn create(&self, new: &NewTransaction) -> Result<Transaction, RepositoryError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions
                 (order_id, buyer_id, seller_id, product_id, amount, platform_fee)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(&new.order_id)
        .bind(new.buyer_id)
        .bind(new.seller_id)
        .bind(new.product_id)
        .bind(new.amount)
        .bind(new.platform_fee)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "order id already exists"))
    }

    /// A transaction by its gateway order id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_order_id(&self, order_id: &str) -> Result<Option<Transaction>, RepositoryError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(transaction)
    }

    /// The buyer's latest pending checkout for a product that already has a
    /// Snap token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_reusable(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE buyer_id = $1 AND product_id = $2
               AND status = 'pending' AND snap_token IS NOT NULL
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(buyer_id)
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(transaction)
    }

    /// Store the Snap token and redirect URL of a pending transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the transaction is gone or no
    /// longer pending.
    pub async fn attach_snap(
        &self,
        order_id: &str,
        snap_token: &str,
        redirect_url: &str,
    ) -> Result<Transaction, RepositoryError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions
             SET snap_token = $2, redirect_url = $3, updated_at = now()
             WHERE order_id = $1 AND status = 'pending'
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(order_id)
        .bind(snap_token)
        .bind(redirect_url)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Mark a pending transaction failed without notifying anyone.
    ///
    /// Used when the checkout could not be created at the gateway.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_failed(&self, order_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE transactions SET status = 'failed', updated_at = now()
             WHERE order_id = $1 AND status = 'pending'",
        )
        .bind(order_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// The user's purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE buyer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(buyer_id)
        .fetch_all(self.pool)
        .await?;

        Ok(transactions)
    }

    /// The user's paid or refunded sales, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_seller(&self, seller_id: UserId) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE seller_id = $1 AND status IN ('paid', 'refunded')
             ORDER BY created_at DESC"
        ))
        .bind(seller_id)
        .fetch_all(self.pool)
        .await?;

        Ok(transactions)
    }

    /// Settle a pending payment.
    ///
    /// In one database transaction: the transaction becomes `paid`, the
    /// product `sold`, other pending checkouts for the product `cancelled`,
    /// the seller is credited the net amount, and `notifications` are
    /// written. Returns `None` if the transaction was no longer pending.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing
    /// is applied in that case.
    pub async fn settle_paid(
        &self,
        order_id: &str,
        details: &PaymentDetails,
        notifications: &[NewNotification],
    ) -> Result<Option<SettledPayment>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(transaction) = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions
             SET status = 'paid', payment_type = $2, gateway_transaction_id = $3,
                 paid_at = now(), updated_at = now()
             WHERE order_id = $1 AND status = 'pending'
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(order_id)
        .bind(&details.payment_type)
        .bind(&details.gateway_transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query("UPDATE products SET status = $2, updated_at = now() WHERE id = $1")
            .bind(transaction.product_id)
            .bind(ProductStatus::Sold)
            .execute(&mut *tx)
            .await?;

        let cancelled_order_ids: Vec<String> = sqlx::query_scalar(
            "UPDATE transactions SET status = 'cancelled', updated_at = now()
             WHERE product_id = $1 AND id <> $2 AND status = 'pending'
             RETURNING order_id",
        )
        .bind(transaction.product_id)
        .bind(transaction.id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET balance = balance + $2, updated_at = now() WHERE id = $1")
            .bind(transaction.seller_id)
            .bind(transaction.net_amount())
            .execute(&mut *tx)
            .await?;

        let mut written = Vec::with_capacity(notifications.len());
        for notification in notifications {
            written.push(insert_with(&mut *tx, notification).await?);
        }

        tx.commit().await?;

        Ok(Some(SettledPayment {
            transaction,
            cancelled_order_ids,
            notifications: written,
        }))
    }

    /// Close a pending transaction as `failed`, `expired` or `cancelled`.
    ///
    /// Returns `None` if the transaction was no longer pending.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn close(
        &self,
        order_id: &str,
        status: TransactionStatus,
        notifications: &[NewNotification],
    ) -> Result<Option<(Transaction, Vec<Notification>)>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(transaction) = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions SET status = $2, updated_at = now()
             WHERE order_id = $1 AND status = 'pending'
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(order_id)
        .bind(status)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let mut written = Vec::with_capacity(notifications.len());
        for notification in notifications {
            written.push(insert_with(&mut *tx, notification).await?);
        }

        tx.commit().await?;

        Ok(Some((transaction, written)))
    }

    /// Refund a settled payment.
    ///
    /// In one database transaction: the transaction becomes `refunded`, the
    /// seller's balance is reduced by the net amount (never below zero), and
    /// the product is listed again. Returns `None` if the transaction was not
    /// `paid`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn refund(
        &self,
        order_id: &str,
        notifications: &[NewNotification],
    ) -> Result<Option<RefundedPayment>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(transaction) = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions SET status = 'refunded', updated_at = now()
             WHERE order_id = $1 AND status = 'paid'
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let balance: Rupiah =
            sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(transaction.seller_id)
                .fetch_one(&mut *tx)
                .await?;

        let net = transaction.net_amount();
        let debit = net.min(balance);
        let shortfall = net.checked_sub(debit).unwrap_or(Rupiah::ZERO);

        sqlx::query("UPDATE users SET balance = balance - $2, updated_at = now() WHERE id = $1")
            .bind(transaction.seller_id)
            .bind(debit)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE products SET status = $2, updated_at = now() WHERE id = $1 AND status = $3",
        )
        .bind(transaction.product_id)
        .bind(ProductStatus::Available)
        .bind(ProductStatus::Sold)
        .execute(&mut *tx)
        .await?;

        let mut written = Vec::with_capacity(notifications.len());
        for notification in notifications {
            written.push(insert_with(&mut *tx, notification).await?);
        }

        tx.commit().await?;

        Ok(Some(RefundedPayment {
            transaction,
            shortfall,
            notifications: written,
        }))
    }
}
