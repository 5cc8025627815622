use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::notification_models::{NewNotification, Notification, NotificationType};
use crate::error::Result;

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub data: Vec<Notification>,
    pub unread_count: i64,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Debug, Validate)]
struct CustomText {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[validate(length(min = 1, max = 1000))]
    message: String,
}

/// Events other marketplace subsystems report so the recipient hears about them.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCompleted {
        user_id: Uuid,
        order_id: Uuid,
        order_number: String,
    },
    ProductApproved {
        user_id: Uuid,
        product_id: Uuid,
        product_title: String,
    },
    ProductRejected {
        user_id: Uuid,
        product_id: Uuid,
        product_title: String,
        reason: Option<String>,
    },
    ReviewReceived {
        user_id: Uuid,
        product_id: Uuid,
        product_title: String,
        rating: u8,
    },
    Custom {
        user_id: Uuid,
        notification_type: NotificationType,
        title: String,
        message: String,
        link: Option<String>,
        related_product_id: Option<Uuid>,
        related_order_id: Option<Uuid>,
    },
}

impl DomainEvent {
    pub fn recipient(&self) -> Uuid {
        match self {
            DomainEvent::OrderCompleted { user_id, .. }
            | DomainEvent::ProductApproved { user_id, .. }
            | DomainEvent::ProductRejected { user_id, .. }
            | DomainEvent::ReviewReceived { user_id, .. }
            | DomainEvent::Custom { user_id, .. } => *user_id,
        }
    }

    /// Map the event onto the inbox entry its recipient sees.
    pub fn into_notification(self) -> Result<NewNotification> {
        let new = match self {
            DomainEvent::OrderCompleted {
                order_id,
                order_number,
                ..
            } => NewNotification::new(
                NotificationType::Order,
                "Order Completed",
                format!("Your order {} has been completed", order_number),
            )
            .with_link("/orders")
            .with_order(order_id),
            DomainEvent::ProductApproved {
                product_id,
                product_title,
                ..
            } => NewNotification::new(
                NotificationType::ProductApproved,
                "Product Approved",
                format!("Your product \"{}\" has been approved", product_title),
            )
            .with_link(format!("/products/{}", product_id))
            .with_product(product_id),
            DomainEvent::ProductRejected {
                product_id,
                product_title,
                reason,
                ..
            } => {
                let message = match reason {
                    Some(reason) if !reason.trim().is_empty() => format!(
                        "Your product \"{}\" was rejected: {}",
                        product_title,
                        reason.trim()
                    ),
                    _ => format!("Your product \"{}\" was rejected", product_title),
                };
                NewNotification::new(NotificationType::ProductRejected, "Product Rejected", message)
                    .with_link("/seller/products")
                    .with_product(product_id)
            }
            DomainEvent::ReviewReceived {
                product_id,
                product_title,
                rating,
                ..
            } => NewNotification::new(
                NotificationType::Review,
                "New Review",
                format!(
                    "Your product \"{}\" received a {}-star review",
                    product_title,
                    rating.clamp(1, 5)
                ),
            )
            .with_link(format!("/products/{}", product_id))
            .with_product(product_id),
            DomainEvent::Custom {
                notification_type,
                title,
                message,
                link,
                related_product_id,
                related_order_id,
                ..
            } => {
                let text = CustomText { title, message };
                text.validate()?;
                NewNotification {
                    notification_type,
                    title: text.title,
                    message: text.message,
                    link,
                    related_product_id,
                    related_order_id,
                }
            }
        };
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    #[test]
    fn test_rejection_includes_reason() {
        let event: DomainEvent = serde_json::from_value(json!({
            "kind": "product_rejected",
            "user_id": Uuid::new_v4(),
            "product_id": Uuid::new_v4(),
            "product_title": "Icon Pack",
            "reason": "  low resolution "
        }))
        .unwrap();

        let new = event.into_notification().unwrap();
        assert_eq!(new.notification_type, NotificationType::ProductRejected);
        assert_eq!(new.message, "Your product \"Icon Pack\" was rejected: low resolution");
        assert!(new.related_product_id.is_some());
    }

    #[test]
    fn test_order_completed_links_order() {
        let order_id = Uuid::new_v4();
        let event = DomainEvent::OrderCompleted {
            user_id: Uuid::new_v4(),
            order_id,
            order_number: "ORD-1001".to_string(),
        };
        let new = event.into_notification().unwrap();
        assert_eq!(new.notification_type, NotificationType::Order);
        assert_eq!(new.related_order_id, Some(order_id));
        assert_eq!(new.message, "Your order ORD-1001 has been completed");
    }

    #[test]
    fn test_custom_event_is_validated() {
        let event: DomainEvent = serde_json::from_value(json!({
            "kind": "custom",
            "user_id": Uuid::new_v4(),
            "notification_type": "system",
            "title": "",
            "message": "Maintenance tonight"
        }))
        .unwrap();

        assert!(matches!(event.into_notification(), Err(AppError::Validation(_))));
    }
}
