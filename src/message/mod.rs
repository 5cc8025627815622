// Declare submodules
pub mod memory_store;
pub mod message_dto;
pub mod message_handlers;
pub mod message_models;
pub mod message_repository;
pub mod message_service;
pub mod routes;
pub mod thread_store;

// Re-export public items
pub use memory_store::InMemoryThreadStore;
pub use message_models::{Conversation, Message, MessageContent};
pub use message_repository::MessageRepository;
pub use message_service::MessagingService;
pub use thread_store::ThreadStore;
