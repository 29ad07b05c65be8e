//! In-app notifications

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::AppResult,
    models::notification::{CreateNotification, Notification},
    repository::Repository,
};

#[derive(Clone)]
pub struct NotificationsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl NotificationsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// A user's inbox, broadcasts included
    pub async fn list_for_user(&self, user_id: i64, unread_only: bool) -> AppResult<Vec<Notification>> {
        self.repository
            .notifications
            .list_for_user(user_id, unread_only)
            .await
    }

    /// Post a message to one user, or to everyone when no recipient is given
    pub async fn send(&self, data: CreateNotification) -> AppResult<Notification> {
        if let Some(user_id) = data.user_id {
            self.repository.users.get_by_id(user_id).await?;
        }

        let notification = self
            .repository
            .notifications
            .create(data.user_id, &data.message, self.clock.now())
            .await?;

        tracing::info!(
            notification_id = notification.id,
            user_id = ?notification.user_id,
            "Notification sent"
        );
        Ok(notification)
    }

    pub async fn mark_read(&self, id: i64, user_id: i64) -> AppResult<Notification> {
        self.repository
            .notifications
            .mark_read(id, user_id, self.clock.now())
            .await
    }
}
