// Declare submodules
pub mod memory_store;
pub mod notification_dto;
pub mod notification_handlers;
pub mod notification_models;
pub mod notification_repository;
pub mod notification_service;
pub mod notification_store;
pub mod routes;

// Re-export public items
pub use memory_store::InMemoryNotificationStore;
pub use notification_models::{NewNotification, Notification, NotificationType};
pub use notification_repository::NotificationRepository;
pub use notification_service::NotificationService;
pub use notification_store::NotificationStore;
