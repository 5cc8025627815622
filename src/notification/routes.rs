use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use super::notification_handlers;
use crate::{
    middleware::{auth_middleware, internal_authorization},
    state::AppState,
};

pub fn notification_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(notification_handlers::get_notifications))
        .route("/unread-count", get(notification_handlers::get_unread_count))
        .route(
            "/mark-all-read",
            put(notification_handlers::mark_all_notifications_read),
        )
        .route(
            "/:id/mark-read",
            put(notification_handlers::mark_notification_read),
        )
        .route("/:id", delete(notification_handlers::delete_notification))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

pub fn internal_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/notifications", post(notification_handlers::raise_notification))
        .route_layer(middleware::from_fn(internal_authorization))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
