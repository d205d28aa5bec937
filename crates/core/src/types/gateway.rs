//! Mapping of gateway status strings to internal statuses.
//!
//! Midtrans, Flip and Xendit each report progress with their own vocabulary.
//! Webhook handlers translate those strings here and then ask
//! `can_transition_to` whether the stored row may move. A repeated delivery of
//! the status a row already has is not a legal transition, which is how
//! duplicate webhooks become no-ops.

use super::status::{TransactionStatus, WithdrawalStatus};

impl TransactionStatus {
    /// Map a Midtrans `transaction_status` / `fraud_status` pair.
    ///
    /// Returns `None` for statuses this marketplace does not act on.
    ///
    /// ```
    /// use unimarket_core::TransactionStatus;
    ///
    /// assert_eq!(
    ///     TransactionStatus::from_midtrans("settlement", None),
    ///     Some(TransactionStatus::Paid)
    /// );
    /// assert_eq!(
    ///     TransactionStatus::from_midtrans("capture", Some("challenge")),
    ///     Some(TransactionStatus::Pending)
    /// );
    /// ```
    #[must_use]
    pub fn from_midtrans(transaction_status: &str, fraud_status: Option<&str>) -> Option<Self> {
        let fraud = fraud_status.map(str::to_ascii_lowercase);
        match transaction_status.to_ascii_lowercase().as_str() {
            "capture" => match fraud.as_deref() {
                None | Some("accept") => Some(Self::Paid),
                Some("challenge") => Some(Self::Pending),
                Some("deny") => Some(Self::Failed),
                Some(_) => None,
            },
            "settlement" => Some(Self::Paid),
            "pending" | "authorize" => Some(Self::Pending),
            "deny" | "failure" => Some(Self::Failed),
            "cancel" => Some(Self::Cancelled),
            "expire" => Some(Self::Expired),
            "refund" | "partial_refund" | "chargeback" | "partial_chargeback" => {
                Some(Self::Refunded)
            }
            _ => None,
        }
    }

    /// Whether a stored transaction in `self` may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Paid | Self::Failed | Self::Expired | Self::Cancelled
            ) | (Self::Paid, Self::Refunded)
        )
    }
}

impl WithdrawalStatus {
    /// Map a Flip disbursement status (`PENDING`, `DONE`, `CANCELLED`, `FAILED`).
    #[must_use]
    pub fn from_flip(status: &str) -> Option<Self> {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Processing),
            "DONE" => Some(Self::Completed),
            "CANCELLED" | "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Map a Xendit disbursement status (`PENDING`, `COMPLETED`, `FAILED`).
    #[must_use]
    pub fn from_xendit(status: &str) -> Option<Self> {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a stored withdrawal in `self` may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Rejected)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}
