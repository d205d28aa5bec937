//! Status enums for marketplace entities.
//!
//! Each enum mirrors a PostgreSQL enum type created by the server migrations
//! (`product_status`, `transaction_status`, ...). Variants serialize as
//! `snake_case` both in JSON and in the database.

use serde::{Deserialize, Serialize};

/// Listing status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "product_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Visible and purchasable.
    #[default]
    Available,
    /// Paid for by a buyer.
    Sold,
    /// Removed by the seller.
    Archived,
}

/// Physical condition of a listed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "product_condition", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductCondition {
    New,
    Used,
}

/// Payment status of a buyer transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "transaction_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created; waiting for the buyer to pay.
    #[default]
    Pending,
    /// Settled by the gateway.
    Paid,
    /// Denied by the gateway or the checkout could not be created.
    Failed,
    /// The payment window closed.
    Expired,
    /// Cancelled by the gateway, or superseded by another buyer's payment.
    Cancelled,
    /// Refunded or charged back after payment.
    Refunded,
}

impl TransactionStatus {
    /// Whether no further transition except a refund can happen.
    #[must_use]
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Database/JSON representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

/// Payout status of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "withdrawal_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Requested by the seller; waiting for an admin.
    #[default]
    Pending,
    /// Sent to the disbursement provider.
    Processing,
    /// Funds arrived in the seller's bank account.
    Completed,
    /// Rejected by an admin, or the provider refused the request.
    Rejected,
    /// The provider accepted the request but the transfer failed.
    Failed,
}

impl WithdrawalStatus {
    /// Whether the withdrawal ended without paying out, so the amount goes
    /// back to the seller's balance.
    #[must_use]
    pub const fn refunds_balance(self) -> bool {
        matches!(self, Self::Rejected | Self::Failed)
    }

    /// Database/JSON representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid withdrawal status: {s}")),
        }
    }
}

/// Marketplace role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Buys and sells.
    #[default]
    User,
    /// Additionally reviews withdrawals.
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "notification_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    PaymentPaid,
    PaymentFailed,
    ProductSold,
    PaymentRefunded,
    WithdrawalRequested,
    WithdrawalCompleted,
    WithdrawalRejected,
    WithdrawalFailed,
}

/// Gateway used to pay out withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "disbursement_provider", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementProvider {
    #[default]
    Flip,
    Xendit,
}

impl std::fmt::Display for DisbursementProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flip => write!(f, "flip"),
            Self::Xendit => write!(f, "xendit"),
        }
    }
}

impl std::str::FromStr for DisbursementProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flip" => Ok(Self::Flip),
            "xendit" => Ok(Self::Xendit),
            _ => Err(format!("invalid disbursement provider: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Paid).unwrap(),
            "\"paid\""
        );
        assert_eq!(
            serde_json::to_string(&NotificationKind::WithdrawalCompleted).unwrap(),
            "\"withdrawal_completed\""
        );
        assert_eq!(
            serde_json::from_str::<ProductCondition>("\"used\"").unwrap(),
            ProductCondition::Used
        );
    }

    #[test]
    fn test_as_str_matches_serde() {
        for status in [
            WithdrawalStatus::Pending,
            WithdrawalStatus::Processing,
            WithdrawalStatus::Completed,
            WithdrawalStatus::Rejected,
            WithdrawalStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<WithdrawalStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_refunds_balance() {
        assert!(WithdrawalStatus::Rejected.refunds_balance());
        assert!(WithdrawalStatus::Failed.refunds_balance());
        assert!(!WithdrawalStatus::Completed.refunds_balance());
        assert!(!WithdrawalStatus::Processing.refunds_balance());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(
            " Xendit ".parse::<DisbursementProvider>().unwrap(),
            DisbursementProvider::Xendit
        );
        assert!("ovo".parse::<DisbursementProvider>().is_err());
    }

    #[test]
    fn test_user_role_roundtrip() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!(UserRole::User.to_string(), "user");
        assert!("root".parse::<UserRole>().is_err());
    }
}
