use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Names a live channel. Rendered as `user:<id>` or `thread:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Inbox and badge updates for one identity.
    User(Uuid),
    /// Live rendering for viewers of one conversation.
    Thread(Uuid),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::User(id) => write!(f, "user:{}", id),
            ChannelKey::Thread(id) => write!(f, "thread:{}", id),
        }
    }
}

/// One published event as seen by subscribers and written to sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("failed to encode payload for {event}: {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
