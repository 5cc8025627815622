use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::{
    notification_dto::{DomainEvent, NotificationListResponse},
    notification_models::Notification,
};
use crate::{
    dto::{AckResponse, UnreadCountResponse},
    error::Result,
    middleware::AuthUser,
    pagination::PageQuery,
    state::AppState,
};

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Get notifications for the authenticated user
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(PageQuery),
    responses(
        (status = 200, description = "Notifications, newest first", body = NotificationListResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn get_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<NotificationListResponse>> {
    query.validate()?;

    let listing = state
        .notification_service
        .list(user_id, query.to_page(DEFAULT_PAGE_SIZE))
        .await?;

    Ok(Json(listing))
}

/// Count unread notifications
#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UnreadCountResponse>> {
    let unread_count = state.notification_service.unread_count(user_id).await?;

    Ok(Json(UnreadCountResponse { unread_count }))
}

/// Mark notification as read
#[utoipa::path(
    put,
    path = "/api/notifications/{id}/mark-read",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 403, description = "Not the recipient"),
        (status = 404, description = "Notification not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let notification = state
        .notification_service
        .mark_read(notification_id, user_id)
        .await?;

    Ok(Json(notification))
}

/// Mark every notification of the caller as read
#[utoipa::path(
    put,
    path = "/api/notifications/mark-all-read",
    responses(
        (status = 200, description = "All notifications marked as read", body = AckResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<AckResponse>> {
    let updated = state.notification_service.mark_all_read(user_id).await?;
    tracing::debug!(%user_id, updated, "notifications marked read");

    Ok(Json(AckResponse::new("All notifications marked as read")))
}

/// Delete a notification
#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification deleted", body = AckResponse),
        (status = 403, description = "Not the recipient"),
        (status = 404, description = "Notification not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<AckResponse>> {
    state
        .notification_service
        .delete(notification_id, user_id)
        .await?;

    Ok(Json(AckResponse::new("Notification deleted")))
}

/// Raise a notification on behalf of another marketplace subsystem
#[utoipa::path(
    post,
    path = "/api/internal/notifications",
    request_body = DomainEvent,
    responses(
        (status = 201, description = "Notification raised", body = Notification),
        (status = 400, description = "Invalid event"),
        (status = 403, description = "Caller lacks the admin or service role"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "notifications",
    security(("bearer_auth" = []))
)]
pub async fn raise_notification(
    State(state): State<AppState>,
    Json(event): Json<DomainEvent>,
) -> Result<impl IntoResponse> {
    let notification = state.notification_service.raise_event(event).await?;

    Ok((StatusCode::CREATED, Json(notification)))
}
