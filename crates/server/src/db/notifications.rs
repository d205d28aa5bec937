//! Notification repository.

use sqlx::{PgConnection, PgPool};

use unimarket_core::{NotificationId, UserId};

use super::RepositoryError;
use crate::models::{NewNotification, Notification};

/// Most notifications returned by one listing.
const LIST_LIMIT: i64 = 100;

/// Repository for in-app notifications.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's latest notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, kind, title, body, link, read_at, created_at
             FROM notifications
             WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
             ORDER BY id DESC
             LIMIT $3",
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(LIST_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(notifications)
    }

    /// Write a notification outside of any transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert(&self, notification: &NewNotification) -> Result<Notification, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_with(&mut *conn, notification).await
    }

    /// Mark one of the user's notifications read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the notification does not
    /// belong to the user.
    pub async fn mark_read(&self, id: NotificationId, user_id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, now())
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark all of the user's notifications read; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = now() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Write a notification on an existing connection or transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_with(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> Result<Notification, RepositoryError> {
    let row = sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (user_id, kind, title, body, link)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, user_id, kind, title, body, link, read_at, created_at",
    )
    .bind(notification.user_id)
    .bind(notification.kind)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.link)
    .fetch_one(conn)
    .await?;

    Ok(row)
}
