//! Domain models for the marketplace.
//!
//! Row types derive `sqlx::FromRow` and `Serialize` so repositories can
//! return them straight to handlers. Request payloads that need checking
//! expose a `validate` method returning [`ValidationError`].

pub mod chat;
pub mod notification;
pub mod product;
pub mod session;
pub mod transaction;
pub mod user;
pub mod withdrawal;

pub use chat::{Conversation, ConversationSummary, Message};
pub use notification::{NewNotification, Notification};
pub use product::{NewProduct, Product, ProductFilter, ProductListing, ProductPatch, WishlistItem};
pub use session::{CurrentUser, keys as session_keys};
pub use transaction::{NewTransaction, PaymentDetails, Transaction};
pub use user::{PayoutAccount, User};
pub use withdrawal::{NewWithdrawal, Withdrawal};

/// A request payload failed validation.
///
/// The message is shown to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Check that `value` has between `min` and `max` characters.
pub(crate) fn check_length(
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError(if min == 0 {
            format!("{field} must be at most {max} characters")
        } else {
            format!("{field} must be between {min} and {max} characters")
        }));
    }
    Ok(())
}
