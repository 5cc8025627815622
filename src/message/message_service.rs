use std::sync::Arc;
use uuid::Uuid;

use super::{
    message_dto::{
        ConversationListResponse, MessageNewEvent, SendMessageRequest, SendMessageResponse,
    },
    message_models::{
        Conversation, ConversationListItem, ConversationView, MessageContent, MessageView,
    },
    thread_store::{not_found, ThreadStore},
};
use crate::{
    directory::{Directory, ProductSummary, UserSummary},
    error::{AppError, Result},
    fanout::{ChannelKey, Fanout},
    notification::{NewNotification, NotificationService, NotificationType},
    pagination::{Page, PaginatedResponse},
};

pub const EVENT_MESSAGE_NEW: &str = "message:new";
pub const EVENT_CONVERSATION_UPSERT: &str = "conversation:upsert";

/// Ties the thread store, directory, fanout and notifications together.
#[derive(Clone)]
pub struct MessagingService {
    threads: Arc<dyn ThreadStore>,
    directory: Arc<dyn Directory>,
    notifications: NotificationService,
    fanout: Fanout,
}

impl MessagingService {
    pub fn new(
        threads: Arc<dyn ThreadStore>,
        directory: Arc<dyn Directory>,
        notifications: NotificationService,
        fanout: Fanout,
    ) -> Self {
        Self {
            threads,
            directory,
            notifications,
            fanout,
        }
    }

    /// Persist a message and return once it is durable.
    ///
    /// Live events and the recipient's notification go out on a spawned task
    /// afterwards; their failure never fails the send.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse> {
        let content = MessageContent::parse(&request.content)?;

        let conversation = match request.conversation_id {
            Some(conversation_id) => {
                let conversation = self
                    .threads
                    .get_conversation(conversation_id)
                    .await?
                    .ok_or_else(not_found)?;
                conversation.ensure_participant(sender_id)?;
                conversation
            }
            None => {
                let recipient_id = request.recipient_id.ok_or(AppError::MissingRecipient)?;
                self.start_conversation(sender_id, recipient_id, request.product_id)
                    .await?
            }
        };

        let (message, conversation) = self
            .threads
            .append_message(conversation.id, sender_id, &content)
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            %sender_id,
            "message sent"
        );

        let view = self.conversation_view(conversation).await;
        let sender = view.participant(sender_id).cloned();
        let message = MessageView::new(message, sender);

        self.deliver(&view, &message);

        Ok(SendMessageResponse {
            message,
            conversation: view,
        })
    }

    /// Zero the reader's counter and tell their other sessions about it.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<ConversationView> {
        let conversation = self.threads.mark_read(conversation_id, reader_id).await?;
        let view = self.conversation_view(conversation).await;

        if let Err(e) = self.fanout.publish(
            &ChannelKey::User(reader_id),
            EVENT_CONVERSATION_UPSERT,
            &view,
        ) {
            tracing::warn!(%conversation_id, "Failed to publish read state: {}", e);
        }

        Ok(view)
    }

    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<ConversationListResponse> {
        let (conversations, total) = self.threads.list_conversations(user_id, page).await?;
        let total_unread = self.threads.total_unread(user_id).await?;

        let mut data = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let unread = conversation.unread_for(user_id);
            let other_id = conversation.other_participant(user_id);
            let view = self.conversation_view(conversation).await;
            let other_participant = other_id.and_then(|id| view.participant(id).cloned());
            data.push(ConversationListItem {
                conversation: view,
                other_participant,
                unread,
            });
        }

        Ok(ConversationListResponse {
            data,
            total_unread,
            total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages(total),
        })
    }

    pub async fn get_conversation(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
    ) -> Result<ConversationView> {
        let conversation = self
            .threads
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(not_found)?;
        conversation.ensure_participant(caller_id)?;

        Ok(self.conversation_view(conversation).await)
    }

    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
        page: Page,
    ) -> Result<PaginatedResponse<MessageView>> {
        let (messages, total) = self
            .threads
            .list_messages(conversation_id, caller_id, page)
            .await?;

        let mut sender_ids: Vec<Uuid> = messages.iter().map(|m| m.sender_id).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let senders = self.users(&sender_ids).await;

        let data = messages
            .into_iter()
            .map(|m| {
                let sender = senders.iter().find(|u| u.id == m.sender_id).cloned();
                MessageView::new(m, sender)
            })
            .collect();

        Ok(PaginatedResponse::new(data, total, page))
    }

    pub async fn delete_conversation(&self, conversation_id: Uuid, caller_id: Uuid) -> Result<()> {
        self.threads
            .delete_conversation(conversation_id, caller_id)
            .await?;
        tracing::info!(%conversation_id, %caller_id, "conversation deleted");
        Ok(())
    }

    pub async fn unread_message_count(&self, user_id: Uuid) -> Result<i64> {
        self.threads.total_unread(user_id).await
    }

    /// Whether the user may listen on the thread channel of this conversation.
    pub async fn can_join(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.threads
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(not_found)?
            .ensure_participant(user_id)
    }

    async fn start_conversation(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Conversation> {
        if recipient_id == sender_id {
            return Err(AppError::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        self.directory
            .user(recipient_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Recipient not found".to_string()))?;

        if let Some(product_id) = product_id {
            self.directory
                .product(product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
        }

        self.threads
            .find_or_create_conversation(sender_id, recipient_id, product_id)
            .await
    }

    fn deliver(&self, conversation: &ConversationView, message: &MessageView) {
        let fanout = self.fanout.clone();
        let notifications = self.notifications.clone();
        let conversation = conversation.clone();
        let message = message.clone();

        tokio::spawn(async move {
            let conversation_id = conversation.id;
            let event = MessageNewEvent {
                conversation_id,
                message: message.clone(),
            };

            if let Err(e) =
                fanout.publish(&ChannelKey::Thread(conversation_id), EVENT_MESSAGE_NEW, &event)
            {
                tracing::warn!(%conversation_id, "Failed to publish message: {}", e);
            }
            for participant in &conversation.participant_ids {
                if let Err(e) = fanout.publish(
                    &ChannelKey::User(*participant),
                    EVENT_CONVERSATION_UPSERT,
                    &conversation,
                ) {
                    tracing::warn!(
                        %conversation_id,
                        user_id = %participant,
                        "Failed to publish conversation: {}",
                        e
                    );
                }
            }

            let sender_name = message
                .sender
                .as_ref()
                .map(|s| s.name.as_str())
                .unwrap_or("a user");
            for recipient in conversation
                .participant_ids
                .iter()
                .filter(|id| **id != message.sender_id)
            {
                let notice = NewNotification::new(
                    NotificationType::Message,
                    "New Message",
                    format!("You have a new message from {}", sender_name),
                )
                .with_link(format!("/messages/{}", conversation_id));
                notifications.raise(*recipient, notice).await;
            }
        });
    }

    async fn conversation_view(&self, conversation: Conversation) -> ConversationView {
        let participants = self.users(&conversation.participants).await;
        let product = match conversation.product_id {
            Some(product_id) => self.product(product_id).await,
            None => None,
        };

        ConversationView {
            id: conversation.id,
            participant_ids: conversation.participants.to_vec(),
            participants,
            product_id: conversation.product_id,
            product,
            last_message: conversation.last_message,
            last_message_at: conversation.last_message_at,
            unread_count: conversation.unread_count,
            created_at: conversation.created_at,
        }
    }

    async fn users(&self, user_ids: &[Uuid]) -> Vec<UserSummary> {
        match self.directory.users(user_ids).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(?user_ids, "User lookup failed: {:?}", e);
                Vec::new()
            }
        }
    }

    async fn product(&self, product_id: Uuid) -> Option<ProductSummary> {
        match self.directory.product(product_id).await {
            Ok(product) => product,
            Err(e) => {
                tracing::warn!(%product_id, "Product lookup failed: {:?}", e);
                None
            }
        }
    }
}
