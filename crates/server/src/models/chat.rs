//! Chat types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use unimarket_core::{ConversationId, MessageId, ProductId, UserId};

use super::{ValidationError, check_length};

/// Longest allowed message body, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;
/// Default number of messages per page.
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;
/// Largest page of messages a client may request.
pub const MAX_MESSAGE_LIMIT: i64 = 100;

/// A buyer/seller conversation about one product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: ConversationId,
    pub product_id: Option<ProductId>,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `user` is the buyer or the seller.
    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }

    /// The participant that is not `user`.
    #[must_use]
    pub fn counterpart_of(&self, user: UserId) -> UserId {
        if self.buyer_id == user {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

/// A conversation as listed in the inbox.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart_id: UserId,
    pub counterpart_name: String,
    pub product_title: Option<String>,
    pub last_message: Option<String>,
    pub unread_count: i64,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Trim a message body and check its length.
///
/// # Errors
///
/// Returns `ValidationError` for empty or over-long bodies.
pub fn validate_message_body(body: &str) -> Result<String, ValidationError> {
    let body = body.trim();
    check_length("message", body, 1, MAX_MESSAGE_LENGTH)?;
    Ok(body.to_string())
}

/// Clamp a requested page size to `1..=100`.
#[must_use]
pub fn clamp_message_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .clamp(1, MAX_MESSAGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_message_body() {
        assert_eq!(
            validate_message_body("  Masih ada kak?  ").ok().as_deref(),
            Some("Masih ada kak?")
        );
        assert!(validate_message_body(" \n\t ").is_err());
        assert!(validate_message_body(&"a".repeat(MAX_MESSAGE_LENGTH)).is_ok());
        assert!(validate_message_body(&"a".repeat(MAX_MESSAGE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_clamp_message_limit() {
        assert_eq!(clamp_message_limit(None), DEFAULT_MESSAGE_LIMIT);
        assert_eq!(clamp_message_limit(Some(0)), 1);
        assert_eq!(clamp_message_limit(Some(1_000)), MAX_MESSAGE_LIMIT);
    }

    #[test]
    fn test_counterpart() {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(1),
            product_id: Some(ProductId::new(7)),
            buyer_id: UserId::new(10),
            seller_id: UserId::new(20),
            last_message_at: now,
            created_at: now,
        };
        assert!(conversation.is_participant(UserId::new(10)));
        assert!(!conversation.is_participant(UserId::new(30)));
        assert_eq!(conversation.counterpart_of(UserId::new(10)), UserId::new(20));
        assert_eq!(conversation.counterpart_of(UserId::new(20)), UserId::new(10));
    }
}
