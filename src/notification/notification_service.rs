use std::sync::Arc;
use uuid::Uuid;

use super::{
    notification_dto::{DomainEvent, NotificationListResponse},
    notification_models::{NewNotification, Notification},
    notification_store::NotificationStore,
};
use crate::{
    error::{AppError, Result},
    pagination::Page,
};

/// The one entry point through which any subsystem raises or reads notifications.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Best-effort insert. A failure is logged and reported as `None`; the
    /// operation that triggered the notification carries on regardless.
    pub async fn raise(&self, user_id: Uuid, new: NewNotification) -> Option<Notification> {
        match self.store.create(user_id, &new).await {
            Ok(notification) => {
                tracing::debug!(
                    %user_id,
                    notification_id = %notification.id,
                    kind = %notification.notification_type,
                    "notification raised"
                );
                Some(notification)
            }
            Err(e) => {
                tracing::error!(
                    %user_id,
                    kind = %new.notification_type,
                    "Error creating notification: {:?}",
                    e
                );
                None
            }
        }
    }

    /// Raise the notification for an event reported by another subsystem.
    ///
    /// Unlike [`raise`](Self::raise), the caller here asked for the
    /// notification itself, so failures are returned.
    pub async fn raise_event(&self, event: DomainEvent) -> Result<Notification> {
        let user_id = event.recipient();
        let new = event.into_notification()?;
        let notification = self.store.create(user_id, &new).await?;
        tracing::info!(
            %user_id,
            notification_id = %notification.id,
            kind = %notification.notification_type,
            "domain event notification raised"
        );
        Ok(notification)
    }

    pub async fn list(&self, user_id: Uuid, page: Page) -> Result<NotificationListResponse> {
        let (data, total) = self.store.find_by_user(user_id, page).await?;
        let unread_count = self.store.count_unread(user_id).await?;

        Ok(NotificationListResponse {
            data,
            unread_count,
            total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages(total),
        })
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        self.store.count_unread(user_id).await
    }

    pub async fn mark_read(&self, notification_id: Uuid, caller_id: Uuid) -> Result<Notification> {
        self.ensure_recipient(notification_id, caller_id).await?;

        self.store
            .mark_as_read(notification_id, caller_id)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        self.store.mark_all_as_read(user_id).await
    }

    pub async fn delete(&self, notification_id: Uuid, caller_id: Uuid) -> Result<()> {
        self.ensure_recipient(notification_id, caller_id).await?;

        let rows_affected = self.store.delete(notification_id, caller_id).await?;
        if rows_affected == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    async fn ensure_recipient(&self, notification_id: Uuid, caller_id: Uuid) -> Result<()> {
        let notification = self
            .store
            .find_by_id(notification_id)
            .await?
            .ok_or_else(not_found)?;

        if notification.user_id != caller_id {
            return Err(AppError::Forbidden("Not authorized".to_string()));
        }
        Ok(())
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Notification not found".to_string())
}
