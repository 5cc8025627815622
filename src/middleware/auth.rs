use crate::{auth::principal_from_token, error::AppError, state::AppState};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authenticated caller, stored in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: String,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .or_else(|| query_token(&req))
        .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))?;

    let (user_id, role) = principal_from_token(&token, &state.config.jwt_secret)?;

    req.extensions_mut().insert(Principal { user_id, role });

    Ok(next.run(req).await)
}

/// Only principals whose token carries `admin` or `service` may raise
/// notifications on behalf of other subsystems.
pub async fn internal_authorization(
    AuthUser(user_id): AuthUser,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let role = req
        .extensions()
        .get::<Principal>()
        .map(|p| p.role.as_str())
        .unwrap_or_default();

    if role != "admin" && role != "service" {
        tracing::warn!(%user_id, role, "rejected internal notification call");
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

// Browsers cannot set headers on WebSocket upgrades.
fn query_token(req: &Request<Body>) -> Option<String> {
    req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=")
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
    })
}

// Extractor for getting user_id from request extensions
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .map(|p| AuthUser(p.user_id))
            .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))
    }
}
