use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{AckResponse, UnreadCountResponse},
    error::Result,
    message::{
        message_dto::{ConversationListResponse, SendMessageRequest, SendMessageResponse},
        message_models::{ConversationView, MessageView},
    },
    middleware::AuthUser,
    pagination::{PageQuery, PaginatedResponse},
    state::AppState,
};

const CONVERSATION_PAGE_SIZE: u32 = 20;
const MESSAGE_PAGE_SIZE: u32 = 50;

/// List the caller's conversations, most recent activity first
#[utoipa::path(
    get,
    path = "/api/messages/conversations",
    tag = "messages",
    params(PageQuery),
    responses(
        (status = 200, description = "Conversations with the caller's unread counts", body = ConversationListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConversationListResponse>> {
    query.validate()?;

    let conversations = state
        .messaging_service
        .list_conversations(user_id, query.to_page(CONVERSATION_PAGE_SIZE))
        .await?;

    Ok(Json(conversations))
}

/// Get a single conversation
#[utoipa::path(
    get,
    path = "/api/messages/conversations/{id}",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation detail", body = ConversationView),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationView>> {
    let conversation = state
        .messaging_service
        .get_conversation(conversation_id, user_id)
        .await?;

    Ok(Json(conversation))
}

/// Get one page of a conversation's messages, oldest first within the page
#[utoipa::path(
    get,
    path = "/api/messages/conversations/{id}/messages",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Messages in chronological order; page 1 is the newest", body = PaginatedResponse<MessageView>),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<MessageView>>> {
    query.validate()?;

    let messages = state
        .messaging_service
        .list_messages(conversation_id, user_id, query.to_page(MESSAGE_PAGE_SIZE))
        .await?;

    Ok(Json(messages))
}

/// Send a message, starting a conversation when none is given
#[utoipa::path(
    post,
    path = "/api/messages/send",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent successfully", body = SendMessageResponse),
        (status = 400, description = "Invalid content or missing recipient"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation or recipient not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let sent = state
        .messaging_service
        .send_message(user_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(sent)))
}

/// Mark every inbound message of a conversation as read
#[utoipa::path(
    put,
    path = "/api/messages/conversations/{id}/mark-read",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Messages marked as read", body = AckResponse),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<AckResponse>> {
    state
        .messaging_service
        .mark_read(conversation_id, user_id)
        .await?;

    Ok(Json(AckResponse::new("Messages marked as read")))
}

/// Delete a conversation and all of its messages
#[utoipa::path(
    delete,
    path = "/api/messages/conversations/{id}",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation deleted", body = AckResponse),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<AckResponse>> {
    state
        .messaging_service
        .delete_conversation(conversation_id, user_id)
        .await?;

    Ok(Json(AckResponse::new("Conversation deleted")))
}

/// Total unread messages across all of the caller's conversations
#[utoipa::path(
    get,
    path = "/api/messages/unread-count",
    tag = "messages",
    responses(
        (status = 200, description = "Unread message count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UnreadCountResponse>> {
    let unread_count = state
        .messaging_service
        .unread_message_count(user_id)
        .await?;

    Ok(Json(UnreadCountResponse { unread_count }))
}
