use serde::Deserialize;
use uuid::Uuid;

use crate::fanout::{ChannelKey, Envelope};

pub const EVENT_ERROR: &str = "error";

/// Error frame sent back on the caller's own channel.
pub fn error_frame(user_id: Uuid, message: impl Into<String>) -> Envelope {
    let message: String = message.into();
    Envelope {
        channel: ChannelKey::User(user_id).to_string(),
        event: EVENT_ERROR.to_string(),
        payload: serde_json::json!({ "message": message }),
    }
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinConversation { conversation_id: Uuid },
    LeaveConversation { conversation_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frames() {
        let id = Uuid::new_v4();
        let join: ClientMessage =
            serde_json::from_value(json!({"type": "join_conversation", "conversation_id": id}))
                .unwrap();
        assert!(matches!(
            join,
            ClientMessage::JoinConversation { conversation_id } if conversation_id == id
        ));

        let unknown = serde_json::from_value::<ClientMessage>(json!({"type": "send_message"}));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_error_frame_shape() {
        let user_id = Uuid::nil();
        let frame = serde_json::to_value(error_frame(user_id, "nope")).unwrap();
        assert_eq!(
            frame,
            json!({
                "channel": format!("user:{}", user_id),
                "event": "error",
                "payload": {"message": "nope"}
            })
        );
    }
}
