use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    Order,
    ProductApproved,
    ProductRejected,
    Review,
    System,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::Message => write!(f, "message"),
            NotificationType::Order => write!(f, "order"),
            NotificationType::ProductApproved => write!(f, "product_approved"),
            NotificationType::ProductRejected => write!(f, "product_rejected"),
            NotificationType::Review => write!(f, "review"),
            NotificationType::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub related_product_id: Option<Uuid>,
    pub related_order_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything a subsystem supplies when raising a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub related_product_id: Option<Uuid>,
    pub related_order_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            link: None,
            related_product_id: None,
            related_order_id: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_product(mut self, product_id: Uuid) -> Self {
        self.related_product_id = Some(product_id);
        self
    }

    pub fn with_order(mut self, order_id: Uuid) -> Self {
        self.related_order_id = Some(order_id);
        self
    }
}
