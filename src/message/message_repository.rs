use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{
    message_models::{ordered_pair, Conversation, Message, MessageContent},
    thread_store::{not_found, ThreadStore},
};
use crate::{
    error::{AppError, Result},
    pagination::Page,
};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, is_read, read_at, created_at";

const CONVERSATION_COLUMNS: &str = "id, participant_low, participant_high, product_id, \
                                    last_message_id, last_message_at, created_at";

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    participant_low: Uuid,
    participant_high: Uuid,
    product_id: Option<Uuid>,
    last_message_id: Option<Uuid>,
    last_message_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl ConversationRow {
    fn ensure_participant(&self, user_id: Uuid) -> Result<()> {
        if self.participant_low == user_id || self.participant_high == user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not authorized to access this conversation".to_string(),
            ))
        }
    }

    /// The conversation without counters or last message.
    fn to_conversation(&self) -> Conversation {
        Conversation {
            id: self.id,
            participants: [self.participant_low, self.participant_high],
            product_id: self.product_id,
            last_message: None,
            last_message_at: self.last_message_at,
            unread_count: BTreeMap::new(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct UnreadRow {
    conversation_id: Uuid,
    user_id: Uuid,
    unread_count: i64,
}

/// Postgres-backed thread store.
///
/// Unread counters live in `conversation_participants`, one row per
/// participant, and are only ever changed in place (`+ 1` or `= 0`) under the
/// row lock, so a send and a mark-read on the same counter serialise.
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_pair(
        &self,
        low: Uuid,
        high: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversations
             WHERE participant_low = $1 AND participant_high = $2
               AND product_id IS NOT DISTINCT FROM $3",
        )
        .bind(low)
        .bind(high)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn lock_conversation(
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        lock: &str,
    ) -> Result<ConversationRow> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = $1 {}",
            CONVERSATION_COLUMNS, lock
        ))
        .bind(conversation_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.ok_or_else(not_found)
    }

    /// Attach counters and last messages to a batch of rows, keeping row order.
    async fn hydrate(&self, rows: Vec<ConversationRow>) -> Result<Vec<Conversation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let last_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.last_message_id).collect();

        let unread = sqlx::query_as::<_, UnreadRow>(
            "SELECT conversation_id, user_id, unread_count
             FROM conversation_participants
             WHERE conversation_id = ANY($1)",
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let last_messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {} FROM messages WHERE id = ANY($1)",
            MESSAGE_COLUMNS
        ))
        .bind(last_ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let mut counters: HashMap<Uuid, BTreeMap<Uuid, i64>> = HashMap::new();
        for row in unread {
            counters
                .entry(row.conversation_id)
                .or_default()
                .insert(row.user_id, row.unread_count);
        }
        let mut last_by_id: HashMap<Uuid, Message> =
            last_messages.into_iter().map(|m| (m.id, m)).collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut conversation = row.to_conversation();
                conversation.unread_count = counters.remove(&row.id).unwrap_or_default();
                conversation.last_message =
                    row.last_message_id.and_then(|id| last_by_id.remove(&id));
                conversation
            })
            .collect())
    }

    async fn load(&self, conversation_id: Uuid) -> Result<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = $1",
            CONVERSATION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(not_found)?;

        self.hydrate(vec![row]).await?.pop().ok_or_else(not_found)
    }
}

#[async_trait]
impl ThreadStore for MessageRepository {
    async fn find_or_create_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<Conversation> {
        let (low, high) = ordered_pair(user_a, user_b);

        // A concurrent delete can remove the winner's row between our insert
        // attempt and the re-select; go round again in that case.
        loop {
            if let Some(id) = self.find_pair(low, high, product_id).await? {
                match self.load(id).await {
                    Ok(conversation) => return Ok(conversation),
                    Err(AppError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            let mut tx = self.pool.begin().await?;
            // The unique index on (low, high, product) turns a lost race into a no-op.
            let inserted = sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO conversations (id, participant_low, participant_high, product_id)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT DO NOTHING
                 RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(low)
            .bind(high)
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(id) = inserted else {
                tx.rollback().await?;
                continue;
            };

            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
                 VALUES ($1, $2, 0), ($1, $3, 0)",
            )
            .bind(id)
            .bind(low)
            .bind(high)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            tracing::debug!(conversation_id = %id, "conversation created");

            return self.load(id).await;
        }
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        match self.load(conversation_id).await {
            Ok(conversation) => Ok(Some(conversation)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &MessageContent,
    ) -> Result<(Message, Conversation)> {
        let mut tx = self.pool.begin().await?;

        // Senders on one thread queue here, so `seq`, `created_at` and the
        // `last_message_id` written below all follow commit order. The lock
        // still lets mark-read's KEY SHARE through.
        let row =
            Self::lock_conversation(&mut tx, conversation_id, "FOR NO KEY UPDATE").await?;
        row.ensure_participant(sender_id)?;

        // NOW() is the transaction start, which may predate the wait above.
        let message = sqlx::query_as::<_, Message>(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
             VALUES ($1, $2, $3, $4, clock_timestamp())
             RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations
             SET last_message_id = $2, last_message_at = GREATEST(last_message_at, $3)
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(message.id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversation_participants
             SET unread_count = unread_count + 1
             WHERE conversation_id = $1 AND user_id <> $2",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let conversation = self.load(conversation_id).await?;
        Ok((message, conversation))
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<Conversation> {
        let mut tx = self.pool.begin().await?;

        let row = Self::lock_conversation(&mut tx, conversation_id, "FOR KEY SHARE").await?;
        row.ensure_participant(reader_id)?;

        // Taking the counter row first means any send that increments it either
        // committed before us (its message is visible below and gets marked) or
        // waits until we commit (its message stays unread and counts as 1).
        sqlx::query(
            "SELECT unread_count FROM conversation_participants
             WHERE conversation_id = $1 AND user_id = $2
             FOR UPDATE",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        let marked = sqlx::query(
            "UPDATE messages
             SET is_read = TRUE, read_at = NOW()
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "UPDATE conversation_participants
             SET unread_count = 0
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(%conversation_id, %reader_id, marked, "messages marked read");

        self.load(conversation_id).await
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Conversation>, i64)> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations
             WHERE participant_low = $1 OR participant_high = $1
             ORDER BY last_message_at DESC, id
             LIMIT $2 OFFSET $3",
            CONVERSATION_COLUMNS
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversations
             WHERE participant_low = $1 OR participant_high = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((self.hydrate(rows).await?, total))
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Message>, i64)> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = $1",
            CONVERSATION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(not_found)?;
        row.ensure_participant(caller_id)?;

        let mut messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {} FROM messages
             WHERE conversation_id = $1
             ORDER BY seq DESC
             LIMIT $2 OFFSET $3",
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((messages, total))
    }

    async fn delete_conversation(&self, conversation_id: Uuid, caller_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = Self::lock_conversation(&mut tx, conversation_id, "FOR UPDATE").await?;
        row.ensure_participant(caller_id)?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn total_unread(&self, user_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(unread_count), 0)::BIGINT
             FROM conversation_participants
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

// These run against a real database and are skipped when DATABASE_URL is unset.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};
    use std::collections::HashSet;

    async fn repository() -> Option<MessageRepository> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres thread store test");
            return None;
        };
        let pool = create_pool(&url, 20).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Some(MessageRepository::new(pool))
    }

    fn content(text: &str) -> MessageContent {
        MessageContent::parse(text).unwrap()
    }

    async fn actual_unread(repo: &MessageRepository, conversation_id: Uuid, user_id: Uuid) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&repo.pool)
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_yields_one_row() {
        let Some(repo) = repository().await else { return };
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let product = Some(Uuid::new_v4());

        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
                repo.find_or_create_conversation(x, y, product).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let conversation = handle.await.unwrap();
            assert_eq!(conversation.unread_for(a), 0);
            assert_eq!(conversation.unread_for(b), 0);
            ids.insert(conversation.id);
        }
        assert_eq!(ids.len(), 1);

        let (low, high) = ordered_pair(a, b);
        let rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversations
             WHERE participant_low = $1 AND participant_high = $2",
        )
        .bind(low)
        .bind(high)
        .fetch_one(&repo.pool)
        .await
        .unwrap();
        assert_eq!(rows, 1);

        let general = repo.find_or_create_conversation(a, b, None).await.unwrap();
        assert!(!ids.contains(&general.id));

        for id in ids.into_iter().chain([general.id]) {
            repo.delete_conversation(id, a).await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_message_is_newest_under_concurrent_sends() {
        let Some(repo) = repository().await else { return };
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = repo.find_or_create_conversation(a, b, None).await.unwrap();

        for round in 0..5 {
            let mut handles = Vec::new();
            for i in 0..16 {
                let repo = repo.clone();
                let sender = if i % 2 == 0 { a } else { b };
                handles.push(tokio::spawn(async move {
                    repo.append_message(conversation.id, sender, &content(&format!("m{}", i)))
                        .await
                        .unwrap()
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            let current = repo.get_conversation(conversation.id).await.unwrap().unwrap();
            let (messages, total) = repo
                .list_messages(conversation.id, a, Page::new(1, 100))
                .await
                .unwrap();
            assert_eq!(total, 16 * (round + 1));

            let newest = messages.last().unwrap();
            let last = current.last_message.unwrap();
            assert_eq!(last.id, newest.id, "round {}", round);
            assert_eq!(current.last_message_at, newest.created_at);
            assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        }

        repo.delete_conversation(conversation.id, a).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_send_racing_mark_read_keeps_counter_exact() {
        let Some(repo) = repository().await else { return };
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = repo.find_or_create_conversation(a, b, None).await.unwrap();

        let sender = {
            let repo = repo.clone();
            tokio::spawn(async move {
                for n in 0..40 {
                    repo.append_message(conversation.id, a, &content(&format!("m{}", n)))
                        .await
                        .unwrap();
                }
            })
        };
        let reader = {
            let repo = repo.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    repo.mark_read(conversation.id, b).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        sender.await.unwrap();
        reader.await.unwrap();

        let current = repo.get_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(
            current.unread_for(b),
            actual_unread(&repo, conversation.id, b).await
        );
        assert_eq!(current.unread_for(a), 0);

        let cleared = repo.mark_read(conversation.id, b).await.unwrap();
        assert_eq!(cleared.unread_for(b), 0);
        assert_eq!(actual_unread(&repo, conversation.id, b).await, 0);
        assert_eq!(repo.total_unread(b).await.unwrap(), 0);

        repo.delete_conversation(conversation.id, b).await.unwrap();
    }

    #[tokio::test]
    async fn test_pages_read_back_chronologically() {
        let Some(repo) = repository().await else { return };
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = repo.find_or_create_conversation(a, b, None).await.unwrap();
        for n in 1..=5 {
            repo.append_message(conversation.id, a, &content(&format!("m{}", n)))
                .await
                .unwrap();
        }

        let texts = |messages: Vec<Message>| -> Vec<String> {
            messages.into_iter().map(|m| m.content).collect()
        };
        let (first, total) = repo
            .list_messages(conversation.id, b, Page::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(texts(first), ["m4", "m5"]);
        let (third, _) = repo
            .list_messages(conversation.id, b, Page::new(3, 2))
            .await
            .unwrap();
        assert_eq!(texts(third), ["m1"]);

        assert!(matches!(
            repo.list_messages(conversation.id, Uuid::new_v4(), Page::new(1, 2))
                .await,
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(repo.total_unread(b).await.unwrap(), 5);

        repo.delete_conversation(conversation.id, a).await.unwrap();
        assert!(repo.get_conversation(conversation.id).await.unwrap().is_none());
    }
}
