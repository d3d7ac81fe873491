//! Bearer authentication for protected routes.
//!
//! `require_auth` verifies the access token, loads the user and injects an
//! [`AuthUser`] into request extensions. `require_admin` must be layered
//! inside it.

use crate::errors::ApiError;
use crate::models::{AuthUser, ClientMeta, User};
use crate::repositories::security_events::NewSecurityEvent;
use crate::repositories::users;
use crate::routes::AppState;
use crate::services::{audit_service, token_service};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use common::types::{SecurityEventType, SecuritySeverity};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// User id of an authenticated caller, copied onto the response so outer
/// layers (audit) can attribute the request.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUserId(pub Uuid);

/// Extract the token from `Authorization: Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "medtag.middleware.auth", "Missing Authorization header");
            ApiError::InvalidToken("Missing Authorization header".to_string())
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "medtag.middleware.auth", "Invalid Authorization header format");
            ApiError::InvalidToken("Invalid Authorization header format".to_string())
        })
}

/// Verify `token` and load its active user.
async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = token_service::verify_access_token(&state.pool, &state.config, token).await?;
    let user_id = claims.user_id()?;

    users::get_by_id(&state.pool, user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| {
            tracing::debug!(target: "medtag.middleware.auth", user_id = %user_id, "Token for missing or inactive user");
            ApiError::InvalidToken("User account is inactive or no longer exists".to_string())
        })
}

#[instrument(skip_all, name = "medtag.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_bearer_token(req.headers())?;

    let user = match authenticate(&state, token).await {
        Ok(user) => user,
        Err(e @ ApiError::InvalidToken(_)) => {
            let meta = req.extensions().get::<ClientMeta>().cloned().unwrap_or_default();
            let mut event = NewSecurityEvent::new(
                SecurityEventType::InvalidToken,
                SecuritySeverity::Warning,
                "Rejected access token".to_string(),
            )
            .with_meta(&meta);
            event.endpoint = Some(req.uri().path().to_string());
            event.action_taken = "Request rejected".to_string();
            audit_service::record_security_event(&state.pool, event).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let user_id = user.user_id;
    req.extensions_mut().insert(AuthUser { user });

    let mut response = next.run(req).await;
    response.extensions_mut().insert(AuthenticatedUserId(user_id));
    Ok(response)
}

/// Reject non-admin callers with 403. Layer inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<impl IntoResponse, ApiError> {
    let is_admin = req
        .extensions()
        .get::<AuthUser>()
        .is_some_and(|auth| auth.role().is_admin());

    if !is_admin {
        return Err(ApiError::Forbidden(
            "Administrator access required".to_string(),
        ));
    }

    Ok(next.run(req).await)
}

/// The caller's user id on public routes, when a valid token is presented.
///
/// A bad or missing token is not an error here; the request is treated as
/// anonymous.
pub async fn optional_user_id(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    let token = extract_bearer_token(headers).ok()?;
    authenticate(state, token).await.ok().map(|user| user.user_id)
}
