//! Notification endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use crate::{
    error::AppResult,
    models::notification::{CreateNotification, Notification},
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationsQuery {
    /// Only notifications not yet marked read
    pub unread: Option<bool>,
}

/// The caller's notifications, broadcasts included. Overdue reminders for the
/// caller's own loans are generated first.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(NotificationsQuery),
    responses(
        (status = 200, description = "Notifications, newest first", body = Vec<Notification>)
    )
)]
pub async fn list_notifications(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<NotificationsQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    state
        .services
        .circulation
        .send_overdue_reminders(Some(claims.user_id))
        .await?;

    let notifications = state
        .services
        .notifications
        .list_for_user(claims.user_id, query.unread.unwrap_or(false))
        .await?;
    Ok(Json(notifications))
}

/// Send a notification to one user, or to everyone
#[utoipa::path(
    post,
    path = "/notifications",
    tag = "notifications",
    security(("bearer_auth" = [])),
    request_body = CreateNotification,
    responses(
        (status = 201, description = "Notification sent", body = Notification),
        (status = 404, description = "Recipient not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_notification(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateNotification>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    claims.require_staff()?;
    request.validate()?;

    let notification = state.services.notifications.send(request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// Mark one of the caller's notifications as read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked read", body = Notification),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_read(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Notification>> {
    let notification = state
        .services
        .notifications
        .mark_read(id, claims.user_id)
        .await?;
    Ok(Json(notification))
}
