use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::message_models::{ConversationListItem, ConversationView, MessageView};

/// Send into an existing conversation, or start one with `recipient_id`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub conversation_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub message: MessageView,
    pub conversation: ConversationView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationListResponse {
    pub data: Vec<ConversationListItem>,
    /// Caller's unread count summed over every conversation, not just this page.
    pub total_unread: i64,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Payload of `message:new` on a thread channel.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageNewEvent {
    pub conversation_id: Uuid,
    pub message: MessageView,
}
