use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    fanout::Envelope,
    middleware::AuthUser,
    state::AppState,
    websocket::types::{error_frame, ClientMessage},
};

use super::connection::Connection;

/// Live channel. The socket starts on the caller's `user:<id>` channel and
/// attaches conversation channels on request.
#[utoipa::path(
    get,
    path = "/api/ws",
    tag = "live",
    params(
        ("token" = Option<String>, Query, description = "Access token when the Authorization header cannot be set")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    let mut connection = Connection::open(user_id, state.fanout.clone(), tx.clone());

    // Spawn task to send events from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(event = %envelope.event, "Unencodable frame: {:?}", e),
            }
        }
    });

    // Spawn task to receive messages from WebSocket
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) =
                        process_client_message(&text, user_id, &state, &mut connection).await
                    {
                        tracing::debug!(%user_id, "Rejected client frame: {}", e);
                        let _ = tx.send(error_frame(user_id, client_error(&e)));
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        // Dropping the connection detaches every channel.
        drop(connection);
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("WebSocket connection closed for user {}", user_id);
}

/// Process incoming client messages
async fn process_client_message(
    text: &str,
    user_id: Uuid,
    state: &AppState,
    connection: &mut Connection,
) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::JoinConversation { conversation_id } => {
            state
                .messaging_service
                .can_join(conversation_id, user_id)
                .await?;
            connection.join(conversation_id);
        }
        ClientMessage::LeaveConversation { conversation_id } => {
            connection.leave(conversation_id);
        }
    }

    Ok(())
}

fn client_error(err: &AppError) -> String {
    match err {
        AppError::Database(_) | AppError::InternalError => "Internal server error".to_string(),
        AppError::NotFound(msg)
        | AppError::Forbidden(msg)
        | AppError::BadRequest(msg)
        | AppError::Unauthorized(msg) => msg.clone(),
        other => other.to_string(),
    }
}
