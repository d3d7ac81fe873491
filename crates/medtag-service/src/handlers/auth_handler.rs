//! `/api/v1/auth` handlers.

use crate::errors::ApiError;
use crate::extract::ApiJson;
use crate::models::{AuthUser, ClientMeta};
use crate::routes::AppState;
use crate::services::{token_service, two_factor_service, user_service};
use axum::{extract::State, http::StatusCode, Extension, Json};
use common::api::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    OtpRequest, RefreshRequest, RefreshResponse, RegisterRequest, TokenPair,
    TwoFactorSetupResponse, TwoFactorVerifyRequest, UpdateUserRequest, UserInfo,
};
use std::sync::Arc;
use tracing::instrument;

/// POST /api/v1/auth/register
#[instrument(skip_all, name = "medtag.handlers.register")]
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenPair>), ApiError> {
    let pair = user_service::register(&state.pool, &state.config, &payload, &meta).await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

/// POST /api/v1/auth/login
///
/// Returns a token pair, or a two-factor challenge for accounts with 2FA.
#[instrument(skip_all, name = "medtag.handlers.login")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = user_service::login(&state.pool, &state.config, &payload, &meta).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/2fa/verify
#[instrument(skip_all, name = "medtag.handlers.verify_2fa")]
pub async fn handle_verify_two_factor(
    State(state): State<Arc<AppState>>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<TwoFactorVerifyRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = user_service::verify_two_factor(&state.pool, &state.config, &payload, &meta).await?;
    Ok(Json(pair))
}

/// POST /api/v1/auth/refresh
#[instrument(skip_all, name = "medtag.handlers.refresh")]
pub async fn handle_refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let response =
        token_service::refresh_access_token(&state.pool, &state.config, &payload.refresh).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/logout
///
/// The body is optional; without a refresh token only the audit row is written.
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Extension(meta): Extension<ClientMeta>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let response = user_service::logout(&state.pool, &auth.user, &payload, &meta).await?;
    Ok(Json(response))
}

/// GET /api/v1/auth/me
pub async fn handle_get_me(Extension(auth): Extension<AuthUser>) -> Json<UserInfo> {
    Json(auth.user.to_info())
}

/// PATCH /api/v1/auth/me
pub async fn handle_update_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserInfo>, ApiError> {
    let info = user_service::update_me(&state.pool, &auth.user, &payload).await?;
    Ok(Json(info))
}

/// POST /api/v1/auth/change-password
#[instrument(skip_all, name = "medtag.handlers.change_password")]
pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let response =
        user_service::change_password(&state.pool, &state.config, &auth.user, &payload, &meta)
            .await?;
    Ok(Json(response))
}

/// GET /api/v1/auth/2fa/enable
pub async fn handle_two_factor_setup(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<TwoFactorSetupResponse>, ApiError> {
    let response = two_factor_service::setup(&state.pool, &state.config, &auth.user).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/2fa/enable
pub async fn handle_two_factor_confirm(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Extension(meta): Extension<ClientMeta>,
    ApiJson(payload): ApiJson<OtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let response = two_factor_service::confirm(
        &state.pool,
        &state.config,
        &auth.user,
        &payload.otp_code,
        &meta,
    )
    .await?;
    Ok(Json(response))
}
