//! Chat repository for conversations and messages.

use sqlx::PgPool;

use unimarket_core::{ConversationId, MessageId, ProductId, UserId};

use super::RepositoryError;
use crate::models::{Conversation, ConversationSummary, Message};

const CONVERSATION_COLUMNS: &str =
    "c.id, c.product_id, c.buyer_id, c.seller_id, c.last_message_at, c.created_at";

/// Repository for buyer/seller chat.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Return the buyer's conversation about a product, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product or a user vanished.
    pub async fn open_conversation(
        &self,
        product_id: ProductId,
        buyer_id: UserId,
        seller_id: UserId,
    ) -> Result<Conversation, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict
        sqlx::query_as::<_, Conversation>(&format!(
            "INSERT INTO conversations AS c (product_id, buyer_id, seller_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (product_id, buyer_id) DO UPDATE SET product_id = EXCLUDED.product_id
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(product_id)
        .bind(buyer_id)
        .bind(seller_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "conversation already exists"))
    }

    /// A conversation by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(conversation)
    }

    /// The user's conversations, latest activity first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let conversations = sqlx::query_as::<_, ConversationSummary>(&format!(
            "SELECT {CONVERSATION_COLUMNS},
                    u.id AS counterpart_id,
                    u.name AS counterpart_name,
                    p.title AS product_title,
                    (SELECT m.body FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.id DESC LIMIT 1) AS last_message,
                    (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id
                       AND m.sender_id <> $1
                       AND m.read_at IS NULL) AS unread_count
             FROM conversations c
             JOIN users u
               ON u.id = CASE WHEN c.buyer_id = $1 THEN c.seller_id ELSE c.buyer_id END
             LEFT JOIN products p ON p.id = c.product_id
             WHERE c.buyer_id = $1 OR c.seller_id = $1
             ORDER BY c.last_message_at DESC, c.id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(conversations)
    }

    /// Messages newest first, optionally only those older than `before`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, conversation_id, sender_id, body, read_at, created_at
             FROM messages
             WHERE conversation_id = $1 AND ($2::integer IS NULL OR id < $2)
             ORDER BY id DESC
             LIMIT $3",
        )
        .bind(conversation_id)
        .bind(before)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(messages)
    }

    /// Append a message and bump the conversation's activity time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either statement fails.
    pub async fn insert_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: &str,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (conversation_id, sender_id, body)
             VALUES ($1, $2, $3)
             RETURNING id, conversation_id, sender_id, body, read_at, created_at",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
            .bind(conversation_id)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(message)
    }

    /// Mark the counterpart's unread messages as read by `reader_id`.
    ///
    /// Returns the number of messages marked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE messages SET read_at = now()
             WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
