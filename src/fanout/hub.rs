use dashmap::DashMap;
use futures::stream::Stream;
use serde::Serialize;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use super::types::{ChannelKey, Envelope, FanoutError};

pub const DEFAULT_CAPACITY: usize = 100;

/// In-process publish/subscribe over per-user and per-thread channels.
///
/// Nothing is persisted: an event reaches only the listeners subscribed at the
/// moment it is published. Publishing never waits on subscribers; one that
/// falls more than `capacity` events behind skips the overflow.
#[derive(Clone)]
pub struct Fanout {
    channels: Arc<DashMap<ChannelKey, broadcast::Sender<Envelope>>>,
    capacity: usize,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event and return how many live subscribers received it.
    pub fn publish<T: Serialize>(
        &self,
        key: &ChannelKey,
        event: &str,
        payload: &T,
    ) -> Result<usize, FanoutError> {
        let payload = serde_json::to_value(payload).map_err(|source| FanoutError::Encode {
            event: event.to_string(),
            source,
        })?;

        let Some(sender) = self.channels.get(key).map(|s| s.value().clone()) else {
            return Ok(0);
        };

        let envelope = Envelope {
            channel: key.to_string(),
            event: event.to_string(),
            payload,
        };

        match sender.send(envelope) {
            Ok(delivered) => {
                tracing::debug!(channel = %key, event, delivered, "published");
                Ok(delivered)
            }
            Err(_) => {
                // Every receiver is gone.
                self.release(key);
                Ok(0)
            }
        }
    }

    /// Subscribe to a channel, creating it on first use.
    ///
    /// The channel is forgotten once the last [`Subscription`] on it is dropped.
    pub fn subscribe(&self, key: ChannelKey) -> Subscription {
        let rx = self
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let events = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                tracing::warn!(channel = %key, error = %err, "subscriber lagged, events dropped");
                None
            }
        });

        Subscription {
            key,
            events: Some(Box::pin(events)),
            fanout: self.clone(),
        }
    }

    /// Forget a channel once its last listener has gone away.
    pub fn release(&self, key: &ChannelKey) {
        self.channels
            .remove_if(key, |_, sender| sender.receiver_count() == 0);
    }

    /// Current listener count on a channel.
    #[cfg(test)]
    pub fn subscriber_count(&self, key: &ChannelKey) -> usize {
        self.channels
            .get(key)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Live events of one channel. Dropping it unsubscribes.
pub struct Subscription {
    key: ChannelKey,
    // Taken on drop so the receiver is gone before the channel is released.
    events: Option<Pin<Box<dyn Stream<Item = Envelope> + Send>>>,
    fanout: Fanout,
}

impl Stream for Subscription {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        match self.events.as_mut() {
            Some(events) => events.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.events.take());
        self.fanout.release(&self.key);
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
