use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    message_models::{ordered_pair, Conversation, Message, MessageContent},
    thread_store::{not_found, ThreadStore},
};
use crate::{error::Result, pagination::Page};

type PairKey = (Uuid, Uuid, Option<Uuid>);

struct ThreadEntry {
    conversation: Conversation,
    messages: Vec<Message>,
    deleted: bool,
}

/// Process-local thread store.
///
/// Each conversation sits behind its own lock, so sends, mark-reads and
/// deletes on one thread are serialised while different threads proceed in
/// parallel. The pair index is a `DashMap` entry, which makes creation atomic.
#[derive(Clone, Default)]
pub struct InMemoryThreadStore {
    threads: Arc<DashMap<Uuid, Arc<Mutex<ThreadEntry>>>>,
    pairs: Arc<DashMap<PairKey, Uuid>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, conversation_id: Uuid) -> Option<Arc<Mutex<ThreadEntry>>> {
        self.threads.get(&conversation_id).map(|e| e.value().clone())
    }

    fn new_entry(low: Uuid, high: Uuid, product_id: Option<Uuid>) -> ThreadEntry {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: [low, high],
            product_id,
            last_message: None,
            last_message_at: now,
            unread_count: BTreeMap::from([(low, 0), (high, 0)]),
            created_at: now,
        };
        ThreadEntry {
            conversation,
            messages: Vec::new(),
            deleted: false,
        }
    }

    #[cfg(test)]
    async fn audit(&self, conversation_id: Uuid, user_id: Uuid) -> (i64, i64) {
        let entry = self.entry(conversation_id).unwrap();
        let guard = entry.lock().await;
        let actual = guard
            .messages
            .iter()
            .filter(|m| m.sender_id != user_id && !m.is_read)
            .count() as i64;
        (guard.conversation.unread_for(user_id), actual)
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn find_or_create_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Conversation> {
        let (low, high) = ordered_pair(user_a, user_b);
        let key = (low, high, product_id);

        loop {
            let id = *self.pairs.entry(key).or_insert_with(|| {
                let entry = Self::new_entry(low, high, product_id);
                let id = entry.conversation.id;
                self.threads.insert(id, Arc::new(Mutex::new(entry)));
                tracing::debug!(conversation_id = %id, "conversation created");
                id
            });

            if let Some(entry) = self.entry(id) {
                let guard = entry.lock().await;
                if !guard.deleted {
                    return Ok(guard.conversation.clone());
                }
            }

            // Lost a race with a delete; drop the stale mapping and retry.
            self.pairs.remove_if(&key, |_, existing| *existing == id);
        }
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let Some(entry) = self.entry(conversation_id) else {
            return Ok(None);
        };
        let guard = entry.lock().await;
        Ok((!guard.deleted).then(|| guard.conversation.clone()))
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &MessageContent,
    ) -> Result<(Message, Conversation)> {
        let entry = self.entry(conversation_id).ok_or_else(not_found)?;
        let mut guard = entry.lock().await;
        if guard.deleted {
            return Err(not_found());
        }
        guard.conversation.ensure_participant(sender_id)?;

        // Keep timestamps monotonic within the thread even if the clock steps back.
        let created_at = match guard.messages.last() {
            Some(last) => Utc::now().max(last.created_at),
            None => Utc::now(),
        };
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.as_str().to_string(),
            is_read: false,
            read_at: None,
            created_at,
        };
        guard.messages.push(message.clone());

        let conversation = &mut guard.conversation;
        conversation.last_message = Some(message.clone());
        conversation.last_message_at = created_at;
        if let Some(recipient) = conversation.other_participant(sender_id) {
            *conversation.unread_count.entry(recipient).or_insert(0) += 1;
        }

        Ok((message, conversation.clone()))
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<Conversation> {
        let entry = self.entry(conversation_id).ok_or_else(not_found)?;
        let mut guard = entry.lock().await;
        if guard.deleted {
            return Err(not_found());
        }
        guard.conversation.ensure_participant(reader_id)?;

        let now = Utc::now();
        let mut marked = 0usize;
        for message in guard
            .messages
            .iter_mut()
            .filter(|m| m.sender_id != reader_id && !m.is_read)
        {
            message.is_read = true;
            message.read_at = Some(now);
            marked += 1;
        }

        let ThreadEntry {
            conversation,
            messages,
            ..
        } = &mut *guard;
        if let Some(last) = conversation.last_message.as_mut() {
            if let Some(current) = messages.iter().find(|m| m.id == last.id) {
                *last = current.clone();
            }
        }
        conversation.unread_count.insert(reader_id, 0);

        tracing::debug!(%conversation_id, %reader_id, marked, "messages marked read");
        Ok(conversation.clone())
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Conversation>, i64)> {
        let entries: Vec<_> = self.threads.iter().map(|e| e.value().clone()).collect();

        let mut conversations = Vec::new();
        for entry in entries {
            let guard = entry.lock().await;
            if !guard.deleted && guard.conversation.is_participant(user_id) {
                conversations.push(guard.conversation.clone());
            }
        }
        conversations.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = conversations.len() as i64;
        Ok((page.slice(&conversations), total))
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Message>, i64)> {
        let entry = self.entry(conversation_id).ok_or_else(not_found)?;
        let guard = entry.lock().await;
        if guard.deleted {
            return Err(not_found());
        }
        guard.conversation.ensure_participant(caller_id)?;

        // Windows count back from the newest message.
        let total = guard.messages.len();
        let end = total.saturating_sub(page.offset() as usize);
        let start = end.saturating_sub(page.limit as usize);

        Ok((guard.messages[start..end].to_vec(), total as i64))
    }

    async fn delete_conversation(&self, conversation_id: Uuid, caller_id: Uuid) -> Result<()> {
        let entry = self.entry(conversation_id).ok_or_else(not_found)?;
        let mut guard = entry.lock().await;
        if guard.deleted {
            return Err(not_found());
        }
        guard.conversation.ensure_participant(caller_id)?;

        let [low, high] = guard.conversation.participants;
        let key = (low, high, guard.conversation.product_id);
        guard.deleted = true;
        guard.messages.clear();

        self.threads.remove(&conversation_id);
        self.pairs
            .remove_if(&key, |_, existing| *existing == conversation_id);
        Ok(())
    }

    async fn total_unread(&self, user_id: Uuid) -> Result<i64> {
        let entries: Vec<_> = self.threads.iter().map(|e| e.value().clone()).collect();

        let mut total = 0;
        for entry in entries {
            let guard = entry.lock().await;
            if !guard.deleted {
                total += guard.conversation.unread_for(user_id);
            }
        }
        Ok(total)
    }
}
