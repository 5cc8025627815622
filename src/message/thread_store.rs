use async_trait::async_trait;
use uuid::Uuid;

use super::message_models::{Conversation, Message, MessageContent};
use crate::{error::Result, pagination::Page};

/// Persistence for conversations, messages and per-participant unread counters.
///
/// Implementations must keep these properties under concurrent callers:
/// - at most one conversation per (unordered pair, product);
/// - messages of one conversation read back in insertion order;
/// - a participant's counter equals their unread message count, with the
///   sender's increment and the reader's reset serialised against each other.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Return the conversation for this pair and product, creating it if needed.
    /// Racing callers all receive the same row.
    async fn find_or_create_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Conversation>;

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    /// Insert a message and bump the recipient's counter in one unit.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the conversation doesn't exist
    /// - `Forbidden` if the sender isn't a participant
    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &MessageContent,
    ) -> Result<(Message, Conversation)>;

    /// Mark every inbound message read for `reader_id` and zero their counter.
    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<Conversation>;

    /// Conversations containing the user, most recent activity first, and the total.
    async fn list_conversations(&self, user_id: Uuid, page: Page)
        -> Result<(Vec<Conversation>, i64)>;

    /// One page of messages in chronological order, and the total.
    ///
    /// Page 1 holds the newest messages.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Message>, i64)>;

    /// Delete the conversation and every message in it.
    async fn delete_conversation(&self, conversation_id: Uuid, caller_id: Uuid) -> Result<()>;

    /// Sum of the user's counters across all of their conversations.
    async fn total_unread(&self, user_id: Uuid) -> Result<i64>;
}

pub(crate) fn not_found() -> crate::error::AppError {
    crate::error::AppError::NotFound("Conversation not found".to_string())
}
