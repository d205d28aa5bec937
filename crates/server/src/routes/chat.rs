//! Buyer/seller chat handlers.
//!
//! Only the two participants of a conversation can see it; everyone else
//! gets a 404 so conversation ids cannot be enumerated.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use unimarket_core::{ConversationId, MessageId, NotificationKind, ProductId, UserId};

use crate::db::{ChatRepository, ProductRepository};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::chat::{clamp_message_limit, validate_message_body};
use crate::models::{Conversation, ConversationSummary, Message, NewNotification};
use crate::routes::Marked;
use crate::services::notifier::Notifier;
use crate::services::realtime::RealtimePayload;
use crate::state::AppState;

/// Longest message preview put in a notification body.
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct OpenConversation {
    pub product_id: ProductId,
}

#[derive(Debug, Deserialize)]
pub struct MessagePage {
    pub before: Option<MessageId>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub body: String,
}

/// Open (or return) the caller's conversation with a product's seller.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn open(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<OpenConversation>,
) -> Result<Json<Conversation>, AppError> {
    let product = ProductRepository::new(state.pool())
        .get(request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    if product.seller_id == user.id {
        return Err(AppError::BadRequest(
            "You cannot chat about your own product".to_string(),
        ));
    }

    let conversation = ChatRepository::new(state.pool())
        .open_conversation(product.id, user.id, product.seller_id)
        .await?;
    Ok(Json(conversation))
}

/// The caller's conversations, latest activity first.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let conversations = ChatRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(conversations))
}

/// A page of messages, newest first.
pub async fn messages(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ConversationId>,
    Query(page): Query<MessagePage>,
) -> Result<Json<Vec<Message>>, AppError> {
    participant_conversation(&state, id, user.id).await?;
    let messages = ChatRepository::new(state.pool())
        .list_messages(id, page.before, clamp_message_limit(page.limit))
        .await?;
    Ok(Json(messages))
}

/// Send a message and push it to the other participant.
#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn send(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ConversationId>,
    Json(request): Json<SendMessage>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let body = validate_message_body(&request.body)?;
    let conversation = participant_conversation(&state, id, user.id).await?;

    let message = ChatRepository::new(state.pool())
        .insert_message(id, user.id, &body)
        .await?;

    let recipient = conversation.counterpart_of(user.id);
    state
        .realtime()
        .publish(recipient, RealtimePayload::Message(message.clone()));

    let notification = NewNotification::new(
        recipient,
        NotificationKind::Message,
        format!("New message from {}", user.name),
        preview(&body),
    )
    .with_link(format!("/chat/{id}"));
    Notifier::new(state.pool(), state.realtime())
        .send(&notification)
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark the counterpart's messages read.
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ConversationId>,
) -> Result<Json<Marked>, AppError> {
    participant_conversation(&state, id, user.id).await?;
    let marked = ChatRepository::new(state.pool())
        .mark_read(id, user.id)
        .await?;
    Ok(Json(Marked { marked }))
}

async fn participant_conversation(
    state: &AppState,
    id: ConversationId,
    user_id: UserId,
) -> Result<Conversation, AppError> {
    ChatRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|c| c.is_participant(user_id))
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
}

fn preview(body: &str) -> String {
    if body.chars().count() <= PREVIEW_CHARS {
        return body.to_string();
    }
    let mut short: String = body.chars().take(PREVIEW_CHARS).collect();
    short.push('…');
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_short_bodies() {
        assert_eq!(preview("Masih ada?"), "Masih ada?");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let body = "é".repeat(PREVIEW_CHARS + 5);
        let short = preview(&body);
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 1);
        assert!(short.ends_with('…'));
    }
}
