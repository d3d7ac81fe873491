//! Request audit middleware.
//!
//! Writes one `audit_logs` row per `/api/` request once the response is
//! known. Mutating requests carry their JSON body with credentials masked.
//! A failed write never changes the response.

use crate::errors::ApiError;
use crate::middleware::auth::AuthenticatedUserId;
use crate::models::ClientMeta;
use crate::repositories::audit_logs::NewAuditLog;
use crate::routes::AppState;
use crate::services::audit_service;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use common::types::{AuditAction, AuditSeverity, ResourceType};
use serde_json::Value;
use std::sync::Arc;

/// Request bodies larger than this are not captured.
pub const MAX_CAPTURED_BODY_BYTES: usize = 64 * 1024;

pub const REDACTED: &str = "***REDACTED***";

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "password_confirm",
    "old_password",
    "new_password",
    "new_password_confirm",
    "token",
    "access",
    "refresh",
    "checksum",
    "otp_code",
    "secret",
];

const AUDITED_PREFIX: &str = "/api/";
const SKIPPED_PREFIX: &str = "/api/v1/audit";

pub fn action_for(method: &Method) -> AuditAction {
    match *method {
        Method::POST => AuditAction::Create,
        Method::PUT | Method::PATCH => AuditAction::Update,
        Method::DELETE => AuditAction::Delete,
        Method::GET => AuditAction::Read,
        _ => AuditAction::Other,
    }
}

pub fn resource_type_for(path: &str) -> ResourceType {
    if path.contains("/profiles") {
        ResourceType::Profile
    } else if path.contains("/nfc") {
        ResourceType::NfcTag
    } else if path.contains("/auth") {
        ResourceType::User
    } else {
        ResourceType::System
    }
}

pub fn severity_for(action: AuditAction, status: StatusCode) -> AuditSeverity {
    if status.as_u16() >= 400 {
        AuditSeverity::High
    } else if matches!(action, AuditAction::Delete | AuditAction::Update) {
        AuditSeverity::Medium
    } else {
        AuditSeverity::Low
    }
}

/// Replace the value of every sensitive key, at any depth.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if SENSITIVE_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                    *inner = Value::String(REDACTED.to_string());
                } else {
                    redact(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn is_audited(path: &str) -> bool {
    path.starts_with(AUDITED_PREFIX) && !path.starts_with(SKIPPED_PREFIX)
}

/// Buffer the body when it is declared small enough. The request is
/// returned intact either way.
async fn capture_body(req: Request) -> Result<(Request, Option<Bytes>), ApiError> {
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(len) if len <= MAX_CAPTURED_BODY_BYTES => {
            let (parts, body) = req.into_parts();
            let bytes = to_bytes(body, MAX_CAPTURED_BODY_BYTES).await.map_err(|e| {
                tracing::debug!(target: "medtag.middleware.audit", error = %e, "Failed to read request body");
                ApiError::BadRequest("Failed to read request body".to_string())
            })?;
            let req = Request::from_parts(parts, Body::from(bytes.clone()));
            Ok((req, Some(bytes)))
        }
        _ => Ok((req, None)),
    }
}

fn redacted_json(bytes: &[u8]) -> Option<Value> {
    let mut value = serde_json::from_slice::<Value>(bytes).ok()?;
    redact(&mut value);
    Some(value)
}

pub async fn audit_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    if !is_audited(&path) {
        return Ok(next.run(req).await);
    }

    let method = req.method().clone();
    let action = action_for(&method);
    let meta = req.extensions().get::<ClientMeta>().cloned().unwrap_or_default();

    let (req, body) = if matches!(action, AuditAction::Create | AuditAction::Update) {
        capture_body(req).await?
    } else {
        (req, None)
    };

    let response = next.run(req).await;

    let status = response.status();
    let user_id = response
        .extensions()
        .get::<AuthenticatedUserId>()
        .map(|AuthenticatedUserId(id)| *id);

    let mut log = NewAuditLog::new(
        action,
        resource_type_for(&path),
        format!("{} {}", method, path),
    )
    .with_meta(&meta);
    log.user_id = user_id;
    log.severity = severity_for(action, status);
    log.endpoint = Some(path);
    log.method = Some(method.to_string());
    log.status_code = Some(i32::from(status.as_u16()));
    log.success = status.as_u16() < 400;
    log.new_value = body.as_deref().and_then(redacted_json);
    if !log.success {
        log.error_message = status.canonical_reason().map(str::to_string);
    }

    audit_service::record(&state.pool, log).await;

    Ok(response)
}
