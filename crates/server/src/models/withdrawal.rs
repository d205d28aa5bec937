//! Seller withdrawals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use unimarket_core::{
    DisbursementProvider, Rupiah, TransactionId, UserId, WithdrawalId, WithdrawalStatus,
};

use super::PayoutAccount;

/// A payout request and its disbursement state.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    /// Idempotency key (Flip) and `external_id` (Xendit).
    pub reference: Uuid,
    pub user_id: UserId,
    pub amount: Rupiah,
    pub provider: DisbursementProvider,
    pub bank_code: String,
    pub account_number: String,
    pub account_holder: String,
    pub status: WithdrawalStatus,
    /// Disbursement id assigned by the provider.
    pub provider_id: Option<String>,
    pub failure_reason: Option<String>,
    pub processed_by: Option<UserId>,
    /// Set for automatic payouts of a settled transaction.
    pub source_transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    /// The payout account snapshot taken when the withdrawal was requested.
    #[must_use]
    pub fn payout_account(&self) -> PayoutAccount {
        PayoutAccount {
            bank_code: self.bank_code.clone(),
            account_number: self.account_number.clone(),
            account_holder: self.account_holder.clone(),
        }
    }
}

/// A withdrawal about to be inserted.
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: UserId,
    pub amount: Rupiah,
    pub provider: DisbursementProvider,
    pub account: PayoutAccount,
    /// `Pending` for seller requests, `Processing` for automatic payouts.
    pub status: WithdrawalStatus,
    pub source_transaction_id: Option<TransactionId>,
}
