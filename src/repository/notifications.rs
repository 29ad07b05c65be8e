//! Notifications repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::{
    error::{AppError, AppResult},
    models::notification::Notification,
};

#[derive(Clone)]
pub struct NotificationsRepository {
    pool: Pool<Sqlite>,
}

impl NotificationsRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create a notification; `None` recipient is a broadcast
    pub async fn create(
        &self,
        user_id: Option<i64>,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> AppResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, message, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(user_id)
        .bind(message)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(notification)
    }

    /// A user's own notifications plus broadcasts, newest first
    pub async fn list_for_user(&self, user_id: i64, unread_only: bool) -> AppResult<Vec<Notification>> {
        let query = if unread_only {
            "SELECT * FROM notifications WHERE (user_id = ? OR user_id IS NULL) AND read_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        } else {
            "SELECT * FROM notifications WHERE user_id = ? OR user_id IS NULL \
             ORDER BY created_at DESC, id DESC"
        };
        let notifications = sqlx::query_as::<_, Notification>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(notifications)
    }

    /// Mark one of the user's own notifications as read
    pub async fn mark_read(&self, id: i64, user_id: i64, at: DateTime<Utc>) -> AppResult<Notification> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET read_at = COALESCE(read_at, ?)
            WHERE id = ? AND user_id = ?
            RETURNING *
            "#,
        )
        .bind(at)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }
}
