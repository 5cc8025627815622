use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use super::message_handlers;
use crate::{middleware::auth_middleware, state::AppState};

pub fn message_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/conversations", get(message_handlers::get_conversations))
        .route(
            "/conversations/:id",
            get(message_handlers::get_conversation).delete(message_handlers::delete_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(message_handlers::get_messages),
        )
        .route(
            "/conversations/:id/mark-read",
            put(message_handlers::mark_conversation_read),
        )
        .route("/send", post(message_handlers::send_message))
        .route("/unread-count", get(message_handlers::get_unread_count))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
