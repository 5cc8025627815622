use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    directory::{ProductSummary, UserSummary},
    error::{AppError, Result},
};

pub const MAX_CONTENT_CHARS: usize = 1000;

/// Message text that has been trimmed and length-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidContent(
                "Message content is required".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::InvalidContent(format!(
                "Message cannot exceed {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A two-party thread, optionally about one product.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub product_id: Option<Uuid>,
    pub last_message: Option<Message>,
    pub last_message_at: DateTime<Utc>,
    /// Absent entries count as zero.
    pub unread_count: BTreeMap<Uuid, i64>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn ensure_participant(&self, user_id: Uuid) -> Result<()> {
        if self.is_participant(user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not authorized to access this conversation".to_string(),
            ))
        }
    }

    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        self.participants.iter().copied().find(|p| *p != user_id)
    }

    pub fn unread_for(&self, user_id: Uuid) -> i64 {
        self.unread_count.get(&user_id).copied().unwrap_or(0)
    }
}

/// Unordered pair normalised so both participants map to the same key.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<UserSummary>,
    pub content: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: Message, sender: Option<UserSummary>) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            sender,
            content: message.content,
            is_read: message.is_read,
            read_at: message.read_at,
            created_at: message.created_at,
        }
    }
}

/// A conversation with its participants and product resolved.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationView {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
    pub participants: Vec<UserSummary>,
    pub product_id: Option<Uuid>,
    pub product: Option<ProductSummary>,
    pub last_message: Option<Message>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: BTreeMap<Uuid, i64>,
    pub created_at: DateTime<Utc>,
}

impl ConversationView {
    pub fn participant(&self, user_id: Uuid) -> Option<&UserSummary> {
        self.participants.iter().find(|p| p.id == user_id)
    }
}

/// One row of a caller's inbox.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationListItem {
    #[serde(flatten)]
    pub conversation: ConversationView,
    pub other_participant: Option<UserSummary>,
    /// The caller's own unread count for this conversation.
    pub unread: i64,
}
