use std::collections::HashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::fanout::{ChannelKey, Envelope, Fanout};

pub type WsSender = mpsc::UnboundedSender<Envelope>;

/// Channel subscriptions held by one socket.
///
/// Every subscribed channel gets a forwarding task that copies its events
/// into the socket's outbound queue. Dropping the connection aborts them all;
/// each task owns its [`Subscription`](crate::fanout::Subscription), so the
/// channel is released once the aborted task is torn down.
pub struct Connection {
    user_id: Uuid,
    fanout: Fanout,
    outbound: WsSender,
    inbox: JoinHandle<()>,
    threads: HashMap<Uuid, JoinHandle<()>>,
}

impl Connection {
    /// Subscribe the socket to its owner's `user:<id>` channel.
    pub fn open(user_id: Uuid, fanout: Fanout, outbound: WsSender) -> Self {
        let inbox = forward(&fanout, ChannelKey::User(user_id), outbound.clone());
        tracing::info!("User {} connected via WebSocket", user_id);

        Self {
            user_id,
            fanout,
            outbound,
            inbox,
            threads: HashMap::new(),
        }
    }

    /// Attach `thread:<id>`. Joining twice keeps a single subscription.
    pub fn join(&mut self, conversation_id: Uuid) {
        if self.threads.contains_key(&conversation_id) {
            return;
        }
        let task = forward(
            &self.fanout,
            ChannelKey::Thread(conversation_id),
            self.outbound.clone(),
        );
        self.threads.insert(conversation_id, task);
        tracing::debug!(user_id = %self.user_id, %conversation_id, "joined conversation");
    }

    pub fn leave(&mut self, conversation_id: Uuid) {
        if let Some(task) = self.threads.remove(&conversation_id) {
            task.abort();
            tracing::debug!(user_id = %self.user_id, %conversation_id, "left conversation");
        }
    }

    #[cfg(test)]
    pub fn joined(&self) -> impl Iterator<Item = &Uuid> {
        self.threads.keys()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inbox.abort();
        for (_, task) in self.threads.drain() {
            task.abort();
        }
        tracing::info!("User {} disconnected from WebSocket", self.user_id);
    }
}

fn forward(fanout: &Fanout, key: ChannelKey, outbound: WsSender) -> JoinHandle<()> {
    let mut events = fanout.subscribe(key);
    tokio::spawn(async move {
        while let Some(envelope) = events.next().await {
            if outbound.send(envelope).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Option<Envelope> {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_user_channel_is_forwarded_on_open() {
        let fanout = Fanout::default();
        let user_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _connection = Connection::open(user_id, fanout.clone(), tx);

        fanout
            .publish(&ChannelKey::User(user_id), "conversation:upsert", &json!({"id": 1}))
            .unwrap();

        let envelope = recv(&mut rx).await.unwrap();
        assert_eq!(envelope.channel, format!("user:{}", user_id));
        assert_eq!(envelope.event, "conversation:upsert");
    }

    #[tokio::test]
    async fn test_join_and_leave_thread() {
        let fanout = Fanout::default();
        let conversation_id = Uuid::new_v4();
        let thread = ChannelKey::Thread(conversation_id);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = Connection::open(Uuid::new_v4(), fanout.clone(), tx);

        connection.join(conversation_id);
        connection.join(conversation_id);
        assert_eq!(fanout.subscriber_count(&thread), 1);
        assert_eq!(connection.joined().count(), 1);

        fanout.publish(&thread, "message:new", &json!({"n": 1})).unwrap();
        assert_eq!(recv(&mut rx).await.unwrap().event, "message:new");

        connection.leave(conversation_id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fanout.subscriber_count(&thread), 0);

        fanout.publish(&thread, "message:new", &json!({"n": 2})).unwrap();
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_connections_leave_no_channels_behind() {
        let fanout = Fanout::default();
        for _ in 0..50 {
            let (tx, _rx) = mpsc::unbounded_channel();
            let mut connection = Connection::open(Uuid::new_v4(), fanout.clone(), tx);
            connection.join(Uuid::new_v4());
            drop(connection);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fanout.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_left_thread_channel_is_released() {
        let fanout = Fanout::default();
        let user_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut connection = Connection::open(user_id, fanout.clone(), tx);

        connection.join(Uuid::new_v4());
        assert_eq!(fanout.channel_count(), 2);
        let joined = *connection.joined().next().unwrap();
        connection.leave(joined);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fanout.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes_everything() {
        let fanout = Fanout::default();
        let user_id = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut connection = Connection::open(user_id, fanout.clone(), tx);
        connection.join(conversation_id);

        drop(connection);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fanout.subscriber_count(&ChannelKey::User(user_id)), 0);
        assert_eq!(fanout.subscriber_count(&ChannelKey::Thread(conversation_id)), 0);
    }
}
