//! Writing notifications and pushing them to their recipients.
//!
//! Flows that change money or listing state write their notifications inside
//! their own database transaction and call [`Notifier::publish`] after commit.
//! Standalone notifications (new chat messages) go through [`Notifier::send`].

use sqlx::PgPool;
use tracing::warn;

use crate::db::NotificationRepository;
use crate::models::{NewNotification, Notification};
use crate::services::realtime::RealtimeHub;

/// Notification writer bound to a pool and the realtime hub.
pub struct Notifier<'a> {
    notifications: NotificationRepository<'a>,
    hub: &'a RealtimeHub,
}

impl<'a> Notifier<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, hub: &'a RealtimeHub) -> Self {
        Self {
            notifications: NotificationRepository::new(pool),
            hub,
        }
    }

    /// Store and push a notification.
    ///
    /// A notification is a side effect of the request that triggered it, so
    /// failures are logged and swallowed.
    pub async fn send(&self, notification: &NewNotification) -> Option<Notification> {
        match self.notifications.insert(notification).await {
            Ok(stored) => {
                self.publish(std::slice::from_ref(&stored));
                Some(stored)
            }
            Err(e) => {
                warn!(
                    user_id = %notification.user_id,
                    kind = ?notification.kind,
                    error = %e,
                    "Failed to store notification"
                );
                None
            }
        }
    }

    /// Push notifications that are already stored.
    pub fn publish(&self, notifications: &[Notification]) {
        self.hub.publish_notifications(notifications);
    }
}
