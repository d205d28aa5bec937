//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use unimarket_core::{Email, Rupiah, UserId, UserRole};

use super::{ValidationError, check_length};

/// A marketplace account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    /// Seller proceeds not yet withdrawn.
    pub balance: Rupiah,
    pub bank_code: Option<String>,
    pub account_number: Option<String>,
    pub account_holder: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The registered payout account, if all of its parts are set.
    #[must_use]
    pub fn payout_account(&self) -> Option<PayoutAccount> {
        match (&self.bank_code, &self.account_number, &self.account_holder) {
            (Some(bank_code), Some(account_number), Some(account_holder)) => Some(PayoutAccount {
                bank_code: bank_code.clone(),
                account_number: account_number.clone(),
                account_holder: account_holder.clone(),
            }),
            _ => None,
        }
    }

    /// Whether the user can review withdrawals.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Bank account that receives a seller's payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    /// Gateway bank code, lower-case (`bca`, `bni`, `mandiri`, ...).
    pub bank_code: String,
    pub account_number: String,
    pub account_holder: String,
}

impl PayoutAccount {
    /// Normalize and validate a submitted payout account.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the bank code is not lower-case
    /// alphanumeric/underscore, the account number is not 5-20 digits, or
    /// the holder name is empty or longer than 100 characters.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let bank_code = self.bank_code.trim().to_ascii_lowercase();
        if bank_code.is_empty()
            || bank_code.len() > 32
            || !bank_code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ValidationError::new("bank_code is invalid"));
        }

        let account_number: String = self
            .account_number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();
        if !(5..=20).contains(&account_number.len())
            || !account_number.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::new(
                "account_number must be 5 to 20 digits",
            ));
        }

        let account_holder = self.account_holder.trim().to_string();
        check_length("account_holder", &account_holder, 1, 100)?;

        Ok(Self {
            bank_code,
            account_number,
            account_holder,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account(bank: &str, number: &str, holder: &str) -> PayoutAccount {
        PayoutAccount {
            bank_code: bank.to_string(),
            account_number: number.to_string(),
            account_holder: holder.to_string(),
        }
    }

    #[test]
    fn test_payout_account_normalizes() {
        let valid = account(" BCA ", "1234-5678 90", "  Siti Rahma ").validate().unwrap();
        assert_eq!(valid, account("bca", "1234567890", "Siti Rahma"));
    }

    #[test]
    fn test_payout_account_rejects_invalid() {
        assert!(account("bca!", "1234567890", "Siti").validate().is_err());
        assert!(account("", "1234567890", "Siti").validate().is_err());
        assert!(account("bca", "1234", "Siti").validate().is_err());
        assert!(account("bca", "12345abc", "Siti").validate().is_err());
        assert!(account("bca", "1".repeat(21).as_str(), "Siti").validate().is_err());
        assert!(account("bca", "1234567890", "   ").validate().is_err());
    }
}
