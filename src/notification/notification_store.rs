use async_trait::async_trait;
use uuid::Uuid;

use super::notification_models::{NewNotification, Notification};
use crate::{error::Result, pagination::Page};

/// Recipient-scoped notification inbox.
///
/// Mutations take the caller's id and only touch rows the caller owns.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, user_id: Uuid, new: &NewNotification) -> Result<Notification>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Newest first, with the total.
    async fn find_by_user(&self, user_id: Uuid, page: Page) -> Result<(Vec<Notification>, i64)>;

    async fn count_unread(&self, user_id: Uuid) -> Result<i64>;

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>>;

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64>;
}
