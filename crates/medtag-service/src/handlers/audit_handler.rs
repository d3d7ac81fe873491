//! `/api/v1/audit` handlers. `logs` and `security-events` sit behind the
//! admin gate in the router.

use crate::errors::ApiError;
use crate::extract::ApiQuery;
use crate::models::AuthUser;
use crate::routes::AppState;
use crate::services::audit_service;
use axum::{
    extract::State,
    Extension, Json,
};
use common::api::{AuditLog, AuditLogFilter, Page, SecurityEvent, SecurityEventFilter};
use std::sync::Arc;

/// GET /api/v1/audit/logs
pub async fn handle_list_logs(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<AuditLogFilter>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let logs = audit_service::list_logs(&state.pool, &filter).await?;
    Ok(Json(logs))
}

/// GET /api/v1/audit/security-events
pub async fn handle_list_security_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<SecurityEventFilter>,
) -> Result<Json<Vec<SecurityEvent>>, ApiError> {
    let events = audit_service::list_security_events(&state.pool, &filter).await?;
    Ok(Json(events))
}

/// GET /api/v1/audit/my-logs
pub async fn handle_my_logs(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(page): ApiQuery<Page>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let logs = audit_service::list_user_logs(&state.pool, auth.user_id(), page).await?;
    Ok(Json(logs))
}
