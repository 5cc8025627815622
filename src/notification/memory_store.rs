use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use uuid::Uuid;

use super::{
    notification_models::{NewNotification, Notification},
    notification_store::NotificationStore,
};
use crate::{error::Result, pagination::Page};

#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    // Sequence breaks ties between notifications raised in the same instant.
    notifications: Arc<DashMap<Uuid, (u64, Notification)>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, user_id: Uuid, new: &NewNotification) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            notification_type: new.notification_type,
            title: new.title.clone(),
            message: new.message.clone(),
            link: new.link.clone(),
            related_product_id: new.related_product_id,
            related_order_id: new.related_order_id,
            is_read: false,
            created_at: Utc::now(),
        };
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.notifications
            .insert(notification.id, (seq, notification.clone()));
        Ok(notification)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.get(&id).map(|n| n.value().1.clone()))
    }

    async fn find_by_user(&self, user_id: Uuid, page: Page) -> Result<(Vec<Notification>, i64)> {
        let mut mine: Vec<(u64, Notification)> = self
            .notifications
            .iter()
            .filter(|n| n.value().1.user_id == user_id)
            .map(|n| n.value().clone())
            .collect();
        mine.sort_by(|a, b| b.0.cmp(&a.0));

        let total = mine.len() as i64;
        let notifications: Vec<Notification> = mine.into_iter().map(|(_, n)| n).collect();
        Ok((page.slice(&notifications), total))
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.value().1.user_id == user_id && !n.value().1.is_read)
            .count() as i64)
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.get_mut(&id).and_then(|mut entry| {
            let notification = &mut entry.value_mut().1;
            if notification.user_id != user_id {
                return None;
            }
            notification.is_read = true;
            Some(notification.clone())
        }))
    }

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64> {
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            let notification = &mut entry.value_mut().1;
            if notification.user_id == user_id && !notification.is_read {
                notification.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let removed = self
            .notifications
            .remove_if(&id, |_, (_, n)| n.user_id == user_id);
        Ok(removed.map(|_| 1).unwrap_or(0))
    }
}
