//! In-process fan-out of new rows to connected clients.
//!
//! Every published event goes through one `tokio::sync::broadcast` channel;
//! each subscriber filters for its own user. A subscriber that falls more
//! than [`CHANNEL_CAPACITY`] events behind skips the missed events instead of
//! blocking publishers.

use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use unimarket_core::UserId;

use crate::models::{Message, Notification};

/// Events buffered per subscriber before it starts lagging.
pub const CHANNEL_CAPACITY: usize = 256;

/// Payload pushed to a user's event stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RealtimePayload {
    Message(Message),
    Notification(Notification),
}

impl RealtimePayload {
    /// SSE event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Notification(_) => "notification",
        }
    }
}

/// An event addressed to one user.
#[derive(Debug, Clone)]
pub struct RealtimeEvent {
    pub recipient: UserId,
    pub payload: RealtimePayload,
}

/// Broadcast hub shared through `AppState`.
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Push an event; a no-op when nobody is listening.
    pub fn publish(&self, recipient: UserId, payload: RealtimePayload) {
        if self
            .sender
            .send(RealtimeEvent { recipient, payload })
            .is_err()
        {
            debug!(%recipient, "No realtime subscribers");
        }
    }

    /// Push stored notifications to their recipients.
    pub fn publish_notifications(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.publish(
                notification.user_id,
                RealtimePayload::Notification(notification.clone()),
            );
        }
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of events addressed to `user_id`.
    ///
    /// The stream ends when the hub is dropped.
    pub fn subscribe(
        &self,
        user_id: UserId,
    ) -> impl Stream<Item = RealtimePayload> + Send + use<> {
        let mut receiver = self.sender.subscribe();

        stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.recipient == user_id => yield event.payload,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%user_id, skipped, "Realtime subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
