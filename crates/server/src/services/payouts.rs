//! Seller withdrawals and their disbursement.
//!
//! Balance moves happen in the repository inside one database transaction;
//! gateway calls happen here, between transactions, never inside one.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use unimarket_core::{
    DisbursementProvider, NotificationKind, Rupiah, UserId, WithdrawalId, WithdrawalStatus,
};

use crate::config::MIN_WITHDRAWAL;
use crate::db::{RepositoryError, UserRepository, WithdrawalRepository};
use crate::gateways::{DisbursementGateway, DisbursementRequest, GatewayError};
use crate::models::{NewNotification, NewWithdrawal, Transaction, Withdrawal};
use crate::services::realtime::RealtimeHub;

/// Shown on the recipient's bank statement.
const PAYOUT_REMARK: &str = "Unimarket payout";

/// Errors from withdrawal operations.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("minimum withdrawal is {}", MIN_WITHDRAWAL)]
    BelowMinimum,

    #[error("set up a payout bank account first")]
    NoPayoutAccount,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("withdrawal not found")]
    NotFound,

    #[error("withdrawal is {}, not pending", .0.as_str())]
    NotPending(WithdrawalStatus),

    #[error("a rejection reason is required")]
    MissingReason,

    /// The provider refused the disbursement; the withdrawal was rejected and
    /// the balance refunded.
    #[error("disbursement failed: {source}")]
    Gateway {
        withdrawal: Box<Withdrawal>,
        #[source]
        source: GatewayError,
    },

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Withdrawal workflow.
pub struct PayoutService<'a> {
    pool: &'a PgPool,
    hub: &'a RealtimeHub,
    provider: DisbursementProvider,
}

impl<'a> PayoutService<'a> {
    /// `provider` is used for new withdrawals; approvals use the provider
    /// recorded on the withdrawal.
    #[must_use]
    pub const fn new(pool: &'a PgPool, hub: &'a RealtimeHub, provider: DisbursementProvider) -> Self {
        Self {
            pool,
            hub,
            provider,
        }
    }

    /// Debit the seller's balance and queue a withdrawal for admin review.
    ///
    /// # Errors
    ///
    /// Returns `PayoutError::BelowMinimum`, `PayoutError::NoPayoutAccount` or
    /// `PayoutError::InsufficientBalance` when the request cannot be accepted.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Rupiah,
    ) -> Result<Withdrawal, PayoutError> {
        if amount < MIN_WITHDRAWAL {
            return Err(PayoutError::BelowMinimum);
        }

        let user = UserRepository::new(self.pool)
            .get_by_id(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let account = user.payout_account().ok_or(PayoutError::NoPayoutAccount)?;

        let notification = NewNotification::new(
            user_id,
            NotificationKind::WithdrawalRequested,
            "Withdrawal requested",
            format!("Your withdrawal of {amount} is waiting for review."),
        )
        .with_link("/wallet");

        let (withdrawal, notifications) = WithdrawalRepository::new(self.pool)
            .create(
                &NewWithdrawal {
                    user_id,
                    amount,
                    provider: self.provider,
                    account,
                    status: WithdrawalStatus::Pending,
                    source_transaction_id: None,
                },
                &[notification],
            )
            .await
            .map_err(insufficient_balance)?;

        self.hub.publish_notifications(&notifications);
        info!(withdrawal_id = %withdrawal.id, "Withdrawal requested");
        Ok(withdrawal)
    }

    /// Approve a pending withdrawal and send it to `gateway`.
    ///
    /// # Errors
    ///
    /// Returns `PayoutError::NotPending` if another admin already acted, and
    /// `PayoutError::Gateway` if the provider refused the disbursement. When
    /// the provider's answer cannot be read the withdrawal is returned still
    /// `processing`.
    #[instrument(skip(self, gateway), fields(provider = %gateway.provider()))]
    pub async fn approve<G: DisbursementGateway + Sync>(
        &self,
        gateway: &G,
        id: WithdrawalId,
        admin_id: UserId,
    ) -> Result<Withdrawal, PayoutError> {
        let repo = WithdrawalRepository::new(self.pool);
        let Some(withdrawal) = repo.start_processing(id, admin_id).await? else {
            return Err(self.not_pending(id).await);
        };

        info!(%admin_id, "Withdrawal approved");
        self.disburse(gateway, withdrawal).await
    }

    /// Reject a pending withdrawal and refund the balance.
    ///
    /// # Errors
    ///
    /// Returns `PayoutError::MissingReason` for a blank reason and
    /// `PayoutError::NotPending` if the withdrawal was already handled.
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        id: WithdrawalId,
        admin_id: UserId,
        reason: &str,
    ) -> Result<Withdrawal, PayoutError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PayoutError::MissingReason);
        }

        let repo = WithdrawalRepository::new(self.pool);
        let Some(current) = repo.get(id).await? else {
            return Err(PayoutError::NotFound);
        };

        let notification = rejected_notification(&current, reason);
        let Some((withdrawal, notifications)) = repo
            .transition(
                id,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Rejected,
                Some(reason),
                &[notification],
            )
            .await?
        else {
            return Err(self.not_pending(id).await);
        };

        self.hub.publish_notifications(&notifications);
        info!(%admin_id, "Withdrawal rejected");
        Ok(withdrawal)
    }

    /// Pay the seller of a just-settled transaction straight away.
    ///
    /// Never fails the caller: problems are logged and, when a withdrawal was
    /// already created, reflected on it.
    #[instrument(skip_all, fields(order_id = %transaction.order_id))]
    pub async fn auto_payout<G: DisbursementGateway + Sync>(
        &self,
        gateway: &G,
        transaction: &Transaction,
    ) -> Option<Withdrawal> {
        let seller = match UserRepository::new(self.pool)
            .get_by_id(transaction.seller_id)
            .await
        {
            Ok(Some(seller)) => seller,
            Ok(None) => {
                warn!(seller_id = %transaction.seller_id, "Seller vanished before auto payout");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Failed to load seller for auto payout");
                return None;
            }
        };

        let Some(account) = seller.payout_account() else {
            info!(seller_id = %seller.id, "Seller has no payout account; funds stay in balance");
            return None;
        };

        let created = WithdrawalRepository::new(self.pool)
            .create(
                &NewWithdrawal {
                    user_id: seller.id,
                    amount: transaction.net_amount(),
                    provider: gateway.provider(),
                    account,
                    status: WithdrawalStatus::Processing,
                    source_transaction_id: Some(transaction.id),
                },
                &[],
            )
            .await;

        let withdrawal = match created {
            Ok((withdrawal, _)) => withdrawal,
            Err(e) => {
                warn!(error = %e, "Auto payout withdrawal not created; funds stay in balance");
                return None;
            }
        };

        match self.disburse(gateway, withdrawal).await {
            Ok(withdrawal) => Some(withdrawal),
            Err(e) => {
                error!(error = %e, "Auto payout failed");
                None
            }
        }
    }

    /// Send a `processing` withdrawal to the provider and record the outcome.
    async fn disburse<G: DisbursementGateway + Sync>(
        &self,
        gateway: &G,
        withdrawal: Withdrawal,
    ) -> Result<Withdrawal, PayoutError> {
        let repo = WithdrawalRepository::new(self.pool);
        let request = DisbursementRequest {
            reference: withdrawal.reference,
            amount: withdrawal.amount,
            account: withdrawal.payout_account(),
            remark: PAYOUT_REMARK.to_owned(),
        };

        let receipt = match gateway.disburse(&request).await {
            Ok(receipt) => receipt,
            Err(source) if source.is_refusal() => {
                return Err(self.refused(withdrawal, source).await);
            }
            Err(source) => return self.await_callback(withdrawal, &source).await,
        };

        let mut withdrawal = repo
            .record_provider_id(withdrawal.id, &receipt.provider_id)
            .await?;

        if withdrawal.status.can_transition_to(receipt.status) {
            let notification = status_notification(&withdrawal, receipt.status, None);
            if let Some((updated, notifications)) = repo
                .transition(
                    withdrawal.id,
                    withdrawal.status,
                    receipt.status,
                    None,
                    notification.as_slice(),
                )
                .await?
            {
                self.hub.publish_notifications(&notifications);
                withdrawal = updated;
            }
        }

        info!(
            withdrawal_id = %withdrawal.id,
            provider_id = %receipt.provider_id,
            status = withdrawal.status.as_str(),
            "Disbursement submitted"
        );
        Ok(withdrawal)
    }

    /// Reject a withdrawal the provider refused and refund the balance.
    async fn refused(&self, withdrawal: Withdrawal, source: GatewayError) -> PayoutError {
        let reason = source.to_string();
        warn!(withdrawal_id = %withdrawal.id, error = %reason, "Disbursement refused");

        let notification = rejected_notification(&withdrawal, &reason);
        let rejected = WithdrawalRepository::new(self.pool)
            .transition(
                withdrawal.id,
                WithdrawalStatus::Processing,
                WithdrawalStatus::Rejected,
                Some(&reason),
                &[notification],
            )
            .await;

        let withdrawal = match rejected {
            Ok(Some((rejected, notifications))) => {
                self.hub.publish_notifications(&notifications);
                rejected
            }
            // A callback already moved it on
            Ok(None) => withdrawal,
            Err(e) => return PayoutError::Repository(e),
        };

        PayoutError::Gateway {
            withdrawal: Box::new(withdrawal),
            source,
        }
    }

    /// Leave a withdrawal the provider may have accepted in `processing`.
    ///
    /// The provider's callback, matched by provider id or reference, settles
    /// it. Refunding here could pay the seller twice.
    async fn await_callback(
        &self,
        withdrawal: Withdrawal,
        source: &GatewayError,
    ) -> Result<Withdrawal, PayoutError> {
        error!(
            withdrawal_id = %withdrawal.id,
            error = %source,
            "Disbursement outcome unknown; waiting for provider callback"
        );

        match source.provider_id() {
            Some(provider_id) => Ok(WithdrawalRepository::new(self.pool)
                .record_provider_id(withdrawal.id, provider_id)
                .await?),
            None => Ok(withdrawal),
        }
    }

    async fn not_pending(&self, id: WithdrawalId) -> PayoutError {
        match WithdrawalRepository::new(self.pool).get(id).await {
            Ok(Some(withdrawal)) => PayoutError::NotPending(withdrawal.status),
            Ok(None) => PayoutError::NotFound,
            Err(e) => PayoutError::Repository(e),
        }
    }
}

fn insufficient_balance(err: RepositoryError) -> PayoutError {
    match err {
        RepositoryError::Conflict(_) => PayoutError::InsufficientBalance,
        other => PayoutError::Repository(other),
    }
}

fn rejected_notification(withdrawal: &Withdrawal, reason: &str) -> NewNotification {
    NewNotification::new(
        withdrawal.user_id,
        NotificationKind::WithdrawalRejected,
        "Withdrawal rejected",
        format!(
            "Your withdrawal of {} was rejected: {reason}. The amount is back in your balance.",
            withdrawal.amount
        ),
    )
    .with_link("/wallet")
}

/// Notification for a provider-driven status change, if the user should hear
/// about it.
pub(crate) fn status_notification(
    withdrawal: &Withdrawal,
    status: WithdrawalStatus,
    reason: Option<&str>,
) -> Option<NewNotification> {
    let (kind, title, body) = match status {
        WithdrawalStatus::Completed => (
            NotificationKind::WithdrawalCompleted,
            "Withdrawal completed",
            format!(
                "{} has been sent to your {} account.",
                withdrawal.amount,
                withdrawal.bank_code.to_ascii_uppercase()
            ),
        ),
        WithdrawalStatus::Failed => (
            NotificationKind::WithdrawalFailed,
            "Withdrawal failed",
            format!(
                "Your withdrawal of {} failed ({}). The amount is back in your balance.",
                withdrawal.amount,
                reason.unwrap_or("no reason given")
            ),
        ),
        WithdrawalStatus::Rejected => {
            return Some(rejected_notification(
                withdrawal,
                reason.unwrap_or("rejected"),
            ));
        }
        WithdrawalStatus::Pending | WithdrawalStatus::Processing => return None,
    };

    Some(NewNotification::new(withdrawal.user_id, kind, title, body).with_link("/wallet"))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn withdrawal(status: WithdrawalStatus) -> Withdrawal {
        Withdrawal {
            id: WithdrawalId::new(5),
            reference: Uuid::nil(),
            user_id: UserId::new(9),
            amount: Rupiah::new(150_000),
            provider: DisbursementProvider::Flip,
            bank_code: "bca".to_string(),
            account_number: "1234567890".to_string(),
            account_holder: "Siti Rahma".to_string(),
            status,
            provider_id: None,
            failure_reason: None,
            processed_by: None,
            source_transaction_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_notifications() {
        let w = withdrawal(WithdrawalStatus::Processing);

        let completed = status_notification(&w, WithdrawalStatus::Completed, None);
        let completed = completed.as_ref().map(|n| (n.kind, n.body.as_str()));
        assert_eq!(
            completed,
            Some((
                NotificationKind::WithdrawalCompleted,
                "Rp150.000 has been sent to your BCA account."
            ))
        );

        let failed = status_notification(&w, WithdrawalStatus::Failed, Some("INVALID_DESTINATION"));
        assert!(failed.is_some_and(|n| n.kind == NotificationKind::WithdrawalFailed
            && n.body.contains("INVALID_DESTINATION")
            && n.user_id == UserId::new(9)));

        assert!(status_notification(&w, WithdrawalStatus::Processing, None).is_none());
    }

    #[test]
    fn test_insufficient_balance_mapping() {
        assert!(matches!(
            insufficient_balance(RepositoryError::Conflict("insufficient balance".into())),
            PayoutError::InsufficientBalance
        ));
        assert!(matches!(
            insufficient_balance(RepositoryError::NotFound),
            PayoutError::Repository(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn test_below_minimum_message() {
        assert_eq!(
            PayoutError::BelowMinimum.to_string(),
            "minimum withdrawal is Rp10.000"
        );
    }
}
