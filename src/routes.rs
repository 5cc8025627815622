use crate::{
    directory::{ProductSummary, UserSummary},
    dto::{AckResponse, UnreadCountResponse},
    message::{
        self,
        message_dto::{
            ConversationListResponse, MessageNewEvent, SendMessageRequest, SendMessageResponse,
        },
        message_models::{ConversationListItem, ConversationView, Message, MessageView},
    },
    middleware::auth_middleware,
    notification::{
        self,
        notification_dto::{DomainEvent, NotificationListResponse},
        Notification, NotificationType,
    },
    state::AppState,
    websocket,
};
use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        message::message_handlers::get_conversations,
        message::message_handlers::get_conversation,
        message::message_handlers::get_messages,
        message::message_handlers::send_message,
        message::message_handlers::mark_conversation_read,
        message::message_handlers::delete_conversation,
        message::message_handlers::get_unread_count,
        notification::notification_handlers::get_notifications,
        notification::notification_handlers::get_unread_count,
        notification::notification_handlers::mark_notification_read,
        notification::notification_handlers::mark_all_notifications_read,
        notification::notification_handlers::delete_notification,
        notification::notification_handlers::raise_notification,
        websocket::handler::ws_handler,
        health_check,
    ),
    components(
        schemas(
            SendMessageRequest,
            SendMessageResponse,
            ConversationListResponse,
            ConversationListItem,
            ConversationView,
            Message,
            MessageView,
            MessageNewEvent,
            UserSummary,
            ProductSummary,
            Notification,
            NotificationType,
            NotificationListResponse,
            DomainEvent,
            UnreadCountResponse,
            AckResponse,
        )
    ),
    tags(
        (name = "messages", description = "Buyer and seller conversations"),
        (name = "notifications", description = "Notification inbox"),
        (name = "live", description = "WebSocket delivery of live events"),
        (name = "health", description = "Service health")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up")
    )
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = Router::new()
        .route("/", get(websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Combine all routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .nest("/messages", message::routes::message_routes(state.clone()))
        .nest(
            "/notifications",
            notification::routes::notification_routes(state.clone()),
        )
        .nest("/internal", notification::routes::internal_routes(state.clone()))
        .nest("/ws", ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::create_access_token,
        directory::InMemoryDirectory,
        message::InMemoryThreadStore,
        notification::InMemoryNotificationStore,
        state::Config,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestApp {
        router: Router,
        secret: String,
        alice: Uuid,
        bob: Uuid,
    }

    fn app() -> TestApp {
        let config = Arc::new(Config::for_tests());
        let directory = InMemoryDirectory::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for (id, name) in [(alice, "Alice"), (bob, "Bob")] {
            directory.insert_user(UserSummary {
                id,
                name: name.to_string(),
                role: "buyer".to_string(),
                store_name: None,
                profile_image: None,
            });
        }

        let state = AppState::new(
            config.clone(),
            Arc::new(InMemoryThreadStore::new()),
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(directory),
        );

        TestApp {
            router: create_router(state),
            secret: config.jwt_secret.clone(),
            alice,
            bob,
        }
    }

    impl TestApp {
        fn token(&self, user_id: Uuid, role: &str) -> String {
            create_access_token(user_id, role, &self.secret).unwrap()
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            user_id: Option<Uuid>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            self.call_as(method, uri, user_id.map(|id| self.token(id, "buyer")), body)
                .await
        }

        async fn call_as(
            &self,
            method: Method,
            uri: &str,
            token: Option<String>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, json)
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app();
        let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_routes_require_token() {
        let app = app();
        for uri in [
            "/api/messages/conversations",
            "/api/messages/unread-count",
            "/api/notifications",
            "/api/ws",
        ] {
            let (status, _) = app.call(Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let (status, body) = app
            .call_as(
                Method::GET,
                "/api/messages/conversations",
                Some("not-a-token".to_string()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_message_flow_over_http() {
        let app = app();

        let (status, sent) = app
            .call(
                Method::POST,
                "/api/messages/send",
                Some(app.alice),
                Some(json!({ "recipient_id": app.bob, "content": "  Hi  " })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["message"]["content"], "Hi");
        let conversation_id = sent["conversation"]["id"].as_str().unwrap().to_string();

        let (status, inbox) = app
            .call(Method::GET, "/api/messages/conversations", Some(app.bob), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inbox["total"], 1);
        assert_eq!(inbox["total_unread"], 1);
        assert_eq!(inbox["data"][0]["unread"], 1);
        assert_eq!(inbox["data"][0]["id"], conversation_id.as_str());

        let (_, count) = app
            .call(Method::GET, "/api/messages/unread-count", Some(app.bob), None)
            .await;
        assert_eq!(count["unread_count"], 1);

        let stranger = Uuid::new_v4();
        let messages_uri = format!("/api/messages/conversations/{}/messages", conversation_id);
        let (status, _) = app.call(Method::GET, &messages_uri, Some(stranger), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mark_uri = format!("/api/messages/conversations/{}/mark-read", conversation_id);
        let (status, _) = app.call(Method::PUT, &mark_uri, Some(app.bob), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, page) = app.call(Method::GET, &messages_uri, Some(app.bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["limit"], 50);
        assert_eq!(page["data"][0]["is_read"], true);

        let (_, count) = app
            .call(Method::GET, "/api/messages/unread-count", Some(app.bob), None)
            .await;
        assert_eq!(count["unread_count"], 0);

        let conversation_uri = format!("/api/messages/conversations/{}", conversation_id);
        let (status, _) = app
            .call(Method::DELETE, &conversation_uri, Some(app.alice), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call(Method::GET, &conversation_uri, Some(app.alice), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_errors_map_to_statuses() {
        let app = app();
        let cases = [
            (json!({ "recipient_id": app.bob, "content": "   " }), StatusCode::BAD_REQUEST),
            (json!({ "content": "Hi" }), StatusCode::BAD_REQUEST),
            (
                json!({ "recipient_id": Uuid::new_v4(), "content": "Hi" }),
                StatusCode::NOT_FOUND,
            ),
            (
                json!({ "conversation_id": Uuid::new_v4(), "content": "Hi" }),
                StatusCode::NOT_FOUND,
            ),
            (
                json!({ "recipient_id": app.bob, "content": "a".repeat(1001) }),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (body, expected) in cases {
            let (status, response) = app
                .call(Method::POST, "/api/messages/send", Some(app.alice), Some(body.clone()))
                .await;
            assert_eq!(status, expected, "{}", body);
            assert!(response["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_page_limit_is_validated() {
        let app = app();
        for uri in [
            "/api/messages/conversations?limit=0",
            "/api/messages/conversations?limit=101",
            "/api/notifications?page=0",
        ] {
            let (status, _) = app.call(Method::GET, uri, Some(app.alice), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_message_raises_notification() {
        let app = app();
        app.call(
            Method::POST,
            "/api/messages/send",
            Some(app.alice),
            Some(json!({ "recipient_id": app.bob, "content": "Hi" })),
        )
        .await;

        let mut listing = Value::Null;
        for _ in 0..50 {
            let (_, body) = app
                .call(Method::GET, "/api/notifications", Some(app.bob), None)
                .await;
            listing = body;
            if listing["total"] == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["unread_count"], 1);
        assert_eq!(listing["data"][0]["type"], "message");
        let notification_id = listing["data"][0]["id"].as_str().unwrap().to_string();

        let mark_uri = format!("/api/notifications/{}/mark-read", notification_id);
        let (status, _) = app.call(Method::PUT, &mark_uri, Some(app.alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = app.call(Method::PUT, &mark_uri, Some(app.bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_read"], true);

        let (_, count) = app
            .call(Method::GET, "/api/notifications/unread-count", Some(app.bob), None)
            .await;
        assert_eq!(count["unread_count"], 0);

        let delete_uri = format!("/api/notifications/{}", notification_id);
        let (status, _) = app.call(Method::DELETE, &delete_uri, Some(app.bob), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::DELETE, &delete_uri, Some(app.bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_internal_events_need_service_role() {
        let app = app();
        let event = json!({
            "kind": "order_completed",
            "user_id": app.bob,
            "order_id": Uuid::new_v4(),
            "order_number": "ORD-7"
        });

        let (status, _) = app
            .call(
                Method::POST,
                "/api/internal/notifications",
                Some(app.alice),
                Some(event.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let service_token = app.token(Uuid::new_v4(), "service");
        let (status, created) = app
            .call_as(
                Method::POST,
                "/api/internal/notifications",
                Some(service_token),
                Some(event),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["type"], "order");
        assert_eq!(created["user_id"], app.bob.to_string());

        let (_, all_read) = app
            .call(Method::PUT, "/api/notifications/mark-all-read", Some(app.bob), None)
            .await;
        assert!(all_read["message"].is_string());
        let (_, count) = app
            .call(Method::GET, "/api/notifications/unread-count", Some(app.bob), None)
            .await;
        assert_eq!(count["unread_count"], 0);
    }
}
