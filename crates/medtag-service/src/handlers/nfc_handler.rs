//! `/api/v1/nfc` handlers.
//!
//! `scan` and `emergency` are public: whoever holds the tag may read the
//! emergency profile. A bearer token, when present and valid, only
//! attributes the read.

use crate::errors::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::optional_user_id;
use crate::models::{AuthUser, ClientMeta};
use crate::routes::AppState;
use crate::services::nfc_service;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use common::api::{
    EmergencyAccess, NfcAccessLog, NfcTag, Page, RegisterTagRequest, RegisterTagResponse,
    RevokeTagRequest, RevokeTagResponse, ScanRequest, ScanResponse,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// GET /api/v1/nfc/tags
pub async fn handle_list_tags(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<NfcTag>>, ApiError> {
    let tags = nfc_service::list_tags(&state.pool, auth.user_id()).await?;
    Ok(Json(tags))
}

/// POST /api/v1/nfc/register
#[instrument(skip_all, name = "medtag.handlers.nfc_register")]
pub async fn handle_register_tag(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<RegisterTagRequest>,
) -> Result<(StatusCode, Json<RegisterTagResponse>), ApiError> {
    let response =
        nfc_service::register_tag(&state.pool, &state.config, &auth.user, &payload, &meta).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/nfc/scan
///
/// A body that does not parse is logged as a failed scan, so it counts
/// toward the per-IP limit like any other bad attempt.
#[instrument(skip_all, name = "medtag.handlers.nfc_scan")]
pub async fn handle_scan(
    State(state): State<Arc<AppState>>,
    Extension(meta): Extension<ClientMeta>,
    headers: HeaderMap,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>, ApiError> {
    let accessed_by = optional_user_id(&state, &headers).await;
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return Err(nfc_service::reject_malformed_scan(
                &state.pool,
                &meta,
                accessed_by,
                ApiError::from(rejection),
            )
            .await);
        }
    };
    let response =
        nfc_service::scan(&state.pool, &state.config, &payload, &meta, accessed_by).await?;
    Ok(Json(response))
}

/// GET /api/v1/nfc/emergency/:tag_id
#[instrument(skip_all, name = "medtag.handlers.nfc_emergency")]
pub async fn handle_emergency(
    State(state): State<Arc<AppState>>,
    Extension(meta): Extension<ClientMeta>,
    headers: HeaderMap,
    ApiPath(tag_id): ApiPath<Uuid>,
) -> Result<Json<ScanResponse>, ApiError> {
    let accessed_by = optional_user_id(&state, &headers).await;
    let response = nfc_service::emergency_by_tag_id(&state.pool, tag_id, &meta, accessed_by).await?;
    Ok(Json(response))
}

/// POST /api/v1/nfc/revoke
pub async fn handle_revoke_tag(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<RevokeTagRequest>,
) -> Result<Json<RevokeTagResponse>, ApiError> {
    let response = nfc_service::revoke_tag(&state.pool, &auth.user, &payload, &meta).await?;
    Ok(Json(response))
}

/// GET /api/v1/nfc/access-logs
pub async fn handle_access_logs(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(page): ApiQuery<Page>,
) -> Result<Json<Vec<NfcAccessLog>>, ApiError> {
    let logs = nfc_service::list_access_logs(&state.pool, &auth.user, page).await?;
    Ok(Json(logs))
}

/// GET /api/v1/nfc/emergency-accesses
pub async fn handle_emergency_accesses(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(page): ApiQuery<Page>,
) -> Result<Json<Vec<EmergencyAccess>>, ApiError> {
    let accesses = nfc_service::list_emergency_accesses(&state.pool, &auth.user, page).await?;
    Ok(Json(accesses))
}
