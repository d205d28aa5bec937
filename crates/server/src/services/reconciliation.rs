//! Applying gateway callbacks to stored rows.
//!
//! Each gateway status is mapped through `unimarket-core`, then checked
//! against the stored row with `can_transition_to`. Illegal transitions
//! (duplicate or late deliveries) are acknowledged without changes, and the
//! repository's conditional updates make two concurrent deliveries of the
//! same callback apply at most once.

use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use unimarket_core::{
    DisbursementProvider, NotificationKind, Rupiah, TransactionStatus, WithdrawalStatus,
};

use crate::db::{RepositoryError, TransactionRepository, WithdrawalRepository};
use crate::gateways::flip::FlipDisbursement;
use crate::gateways::midtrans::MidtransTransaction;
use crate::gateways::xendit::XenditDisbursement;
use crate::models::{NewNotification, PaymentDetails, Transaction, Withdrawal};
use crate::services::payouts::{PayoutService, status_notification};
use crate::state::AppState;

/// Errors from webhook handling.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Midtrans `signature_key` did not match.
    #[error("invalid signature")]
    InvalidSignature,

    /// Flip or Xendit callback token did not match.
    #[error("invalid callback token")]
    InvalidToken,

    #[error("unknown order {0}")]
    UnknownOrder(String),

    #[error("unknown disbursement {0}")]
    UnknownWithdrawal(String),

    #[error("gross amount {received} does not match {expected}")]
    AmountMismatch { expected: Rupiah, received: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What a delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The row moved to a new status.
    Applied,
    /// The row was already past this status.
    Unchanged,
    /// The gateway status is not one we act on.
    Ignored,
}

/// Applies Midtrans, Flip and Xendit callbacks.
pub struct Reconciler<'a> {
    state: &'a AppState,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Apply a Midtrans notification or status response.
    ///
    /// The caller has already authenticated the payload.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::UnknownOrder` for an order we never created and
    /// `WebhookError::AmountMismatch` when the paid amount differs from ours.
    #[instrument(skip_all, fields(order_id = %notification.order_id, status = ?notification.transaction_status))]
    pub async fn apply_midtrans(
        &self,
        notification: &MidtransTransaction,
    ) -> Result<Outcome, WebhookError> {
        let transactions = TransactionRepository::new(self.state.pool());
        let transaction = transactions
            .get_by_order_id(&notification.order_id)
            .await?
            .ok_or_else(|| WebhookError::UnknownOrder(notification.order_id.clone()))?;

        let gross = Rupiah::parse_gateway_amount(&notification.gross_amount)
            .map_err(|e| WebhookError::Malformed(e.to_string()))?;
        if gross != transaction.amount {
            return Err(WebhookError::AmountMismatch {
                expected: transaction.amount,
                received: notification.gross_amount.clone(),
            });
        }

        let raw_status = notification.transaction_status.as_deref().unwrap_or_default();
        let Some(target) =
            TransactionStatus::from_midtrans(raw_status, notification.fraud_status.as_deref())
        else {
            warn!("Ignoring unrecognized Midtrans status");
            return Ok(Outcome::Ignored);
        };

        if !transaction.status.can_transition_to(target) {
            if is_late_settlement(transaction.status, target) {
                error!(
                    buyer_id = %transaction.buyer_id,
                    amount = %transaction.amount,
                    current = transaction.status.as_str(),
                    "Payment settled on a closed transaction; buyer needs a manual refund"
                );
            } else {
                info!(
                    current = transaction.status.as_str(),
                    target = target.as_str(),
                    "Transaction already reconciled"
                );
            }
            return Ok(Outcome::Unchanged);
        }

        match target {
            TransactionStatus::Paid => self.settle(&transaction, notification).await,
            TransactionStatus::Refunded => self.refund(&transaction).await,
            TransactionStatus::Failed | TransactionStatus::Expired | TransactionStatus::Cancelled => {
                self.close(&transaction, target).await
            }
            TransactionStatus::Pending => Ok(Outcome::Unchanged),
        }
    }

    async fn settle(
        &self,
        transaction: &Transaction,
        notification: &MidtransTransaction,
    ) -> Result<Outcome, WebhookError> {
        let details = PaymentDetails {
            payment_type: notification.payment_type.clone(),
            gateway_transaction_id: notification.transaction_id.clone(),
        };
        let link = format!("/transactions/{}", transaction.order_id);
        let notifications = [
            NewNotification::new(
                transaction.buyer_id,
                NotificationKind::PaymentPaid,
                "Payment received",
                format!(
                    "Your payment of {} for order {} was received.",
                    transaction.amount, transaction.order_id
                ),
            )
            .with_link(link.clone()),
            NewNotification::new(
                transaction.seller_id,
                NotificationKind::ProductSold,
                "Item sold",
                format!(
                    "Order {} was paid. {} has been added to your balance.",
                    transaction.order_id,
                    transaction.net_amount()
                ),
            )
            .with_link(link),
        ];

        let Some(settled) = TransactionRepository::new(self.state.pool())
            .settle_paid(&transaction.order_id, &details, &notifications)
            .await?
        else {
            return Ok(Outcome::Unchanged);
        };

        self.state
            .realtime()
            .publish_notifications(&settled.notifications);
        info!(
            net_amount = %settled.transaction.net_amount(),
            cancelled = settled.cancelled_order_ids.len(),
            "Payment settled"
        );
        if !settled.cancelled_order_ids.is_empty() {
            info!(order_ids = ?settled.cancelled_order_ids, "Cancelled competing checkouts");
        }

        let payouts = &self.state.config().payouts;
        if payouts.auto_payout {
            let gateway = self.state.disburser(payouts.provider);
            PayoutService::new(self.state.pool(), self.state.realtime(), payouts.provider)
                .auto_payout(&gateway, &settled.transaction)
                .await;
        }

        Ok(Outcome::Applied)
    }

    async fn close(
        &self,
        transaction: &Transaction,
        status: TransactionStatus,
    ) -> Result<Outcome, WebhookError> {
        let reason = match status {
            TransactionStatus::Expired => "expired",
            TransactionStatus::Cancelled => "was cancelled",
            _ => "failed",
        };
        let notification = NewNotification::new(
            transaction.buyer_id,
            NotificationKind::PaymentFailed,
            "Payment not completed",
            format!("Your payment for order {} {reason}.", transaction.order_id),
        )
        .with_link(format!("/transactions/{}", transaction.order_id));

        let Some((_, notifications)) = TransactionRepository::new(self.state.pool())
            .close(&transaction.order_id, status, &[notification])
            .await?
        else {
            return Ok(Outcome::Unchanged);
        };

        self.state.realtime().publish_notifications(&notifications);
        info!(status = status.as_str(), "Transaction closed");
        Ok(Outcome::Applied)
    }

    async fn refund(&self, transaction: &Transaction) -> Result<Outcome, WebhookError> {
        let link = format!("/transactions/{}", transaction.order_id);
        let notifications = [
            NewNotification::new(
                transaction.buyer_id,
                NotificationKind::PaymentRefunded,
                "Payment refunded",
                format!("Order {} was refunded.", transaction.order_id),
            )
            .with_link(link.clone()),
            NewNotification::new(
                transaction.seller_id,
                NotificationKind::PaymentRefunded,
                "Sale refunded",
                format!(
                    "Order {} was refunded; {} was deducted from your balance and the item is listed again.",
                    transaction.order_id,
                    transaction.net_amount()
                ),
            )
            .with_link(link),
        ];

        let Some(refunded) = TransactionRepository::new(self.state.pool())
            .refund(&transaction.order_id, &notifications)
            .await?
        else {
            return Ok(Outcome::Unchanged);
        };

        self.state
            .realtime()
            .publish_notifications(&refunded.notifications);
        if refunded.shortfall.is_positive() {
            warn!(
                seller_id = %refunded.transaction.seller_id,
                shortfall = %refunded.shortfall,
                "Refund exceeded seller balance; shortfall needs manual recovery"
            );
        }
        info!("Payment refunded");
        Ok(Outcome::Applied)
    }

    /// Apply a Flip disbursement callback.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::UnknownWithdrawal` if neither the Flip id nor
    /// the idempotency key matches a withdrawal.
    #[instrument(skip_all, fields(provider_id = %data.id, status = %data.status))]
    pub async fn apply_flip(&self, data: &FlipDisbursement) -> Result<Outcome, WebhookError> {
        let repo = WithdrawalRepository::new(self.state.pool());
        let mut withdrawal = repo
            .find_by_provider_id(DisbursementProvider::Flip, &data.id)
            .await?;
        if withdrawal.is_none() {
            if let Some(reference) = data
                .idempotency_key
                .as_deref()
                .and_then(|key| Uuid::parse_str(key).ok())
            {
                withdrawal = repo.find_by_reference(reference).await?;
            }
        }
        let withdrawal = withdrawal.ok_or_else(|| WebhookError::UnknownWithdrawal(data.id.clone()))?;

        let Some(target) = WithdrawalStatus::from_flip(&data.status) else {
            warn!("Ignoring unrecognized Flip status");
            return Ok(Outcome::Ignored);
        };

        let reason = data.reason.as_deref().filter(|r| !r.trim().is_empty());
        self.apply_withdrawal_status(&withdrawal, target, reason).await
    }

    /// Apply a Xendit disbursement callback.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::UnknownWithdrawal` if `external_id` is not one
    /// of our references.
    #[instrument(skip_all, fields(external_id = %data.external_id, status = %data.status))]
    pub async fn apply_xendit(&self, data: &XenditDisbursement) -> Result<Outcome, WebhookError> {
        let unknown = || WebhookError::UnknownWithdrawal(data.external_id.clone());
        let reference = Uuid::parse_str(&data.external_id).map_err(|_| unknown())?;
        let withdrawal = WithdrawalRepository::new(self.state.pool())
            .find_by_reference(reference)
            .await?
            .ok_or_else(unknown)?;

        let Some(target) = WithdrawalStatus::from_xendit(&data.status) else {
            warn!("Ignoring unrecognized Xendit status");
            return Ok(Outcome::Ignored);
        };

        self.apply_withdrawal_status(&withdrawal, target, data.failure_code.as_deref())
            .await
    }

    async fn apply_withdrawal_status(
        &self,
        withdrawal: &Withdrawal,
        target: WithdrawalStatus,
        reason: Option<&str>,
    ) -> Result<Outcome, WebhookError> {
        if !withdrawal.status.can_transition_to(target) {
            info!(
                withdrawal_id = %withdrawal.id,
                current = withdrawal.status.as_str(),
                target = target.as_str(),
                "Withdrawal already reconciled"
            );
            return Ok(Outcome::Unchanged);
        }

        let notification = status_notification(withdrawal, target, reason);
        let failure_reason = if target == WithdrawalStatus::Failed {
            Some(reason.unwrap_or("disbursement failed"))
        } else {
            None
        };

        let Some((updated, notifications)) = WithdrawalRepository::new(self.state.pool())
            .transition(
                withdrawal.id,
                withdrawal.status,
                target,
                failure_reason,
                notification.as_slice(),
            )
            .await?
        else {
            return Ok(Outcome::Unchanged);
        };

        self.state.realtime().publish_notifications(&notifications);
        info!(
            withdrawal_id = %updated.id,
            status = updated.status.as_str(),
            "Withdrawal updated from callback"
        );
        Ok(Outcome::Applied)
    }
}

/// Money arrived for a checkout that was already closed, for example one
/// cancelled because another buyer paid first.
const fn is_late_settlement(current: TransactionStatus, target: TransactionStatus) -> bool {
    matches!(target, TransactionStatus::Paid)
        && matches!(
            current,
            TransactionStatus::Cancelled | TransactionStatus::Expired | TransactionStatus::Failed
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_settlement_detection() {
        for closed in [
            TransactionStatus::Cancelled,
            TransactionStatus::Expired,
            TransactionStatus::Failed,
        ] {
            assert!(is_late_settlement(closed, TransactionStatus::Paid));
            assert!(!is_late_settlement(closed, TransactionStatus::Cancelled));
        }
        assert!(!is_late_settlement(TransactionStatus::Paid, TransactionStatus::Paid));
        assert!(!is_late_settlement(TransactionStatus::Refunded, TransactionStatus::Paid));
    }
}
