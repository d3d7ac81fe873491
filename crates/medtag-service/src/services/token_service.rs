use crate::config::Config;
use crate::crypto::{self, UserClaims};
use crate::errors::ApiError;
use crate::models::{ClientMeta, User};
use crate::observability::metrics::record_token_issuance;
use crate::repositories::{refresh_tokens, users};
use crate::services::key_management_service;
use chrono::{Duration, Utc};
use common::api::{RefreshResponse, TokenPair};
use common::secret::ExposeSecret;
use sqlx::PgPool;
use std::time::Instant;
use uuid::Uuid;

const INVALID_REFRESH_MESSAGE: &str = "The refresh token is invalid or expired";

/// Sign a fresh access token for `user` with the active signing key.
pub async fn issue_access_token(
    pool: &PgPool,
    config: &Config,
    user: &User,
) -> Result<String, ApiError> {
    let signing_key =
        key_management_service::load_active_signing_key(pool, config.master_key.expose_secret())
            .await?;

    let now = Utc::now().timestamp();
    let claims = UserClaims {
        sub: user.user_id.to_string(),
        email: user.email.clone(),
        role: user.role,
        iat: now,
        exp: now + config.access_token_ttl_seconds,
        jti: Uuid::new_v4().to_string(),
    };

    crypto::sign_access_token(
        &claims,
        signing_key.private_key_pkcs8.expose_secret(),
        &signing_key.key_id,
    )
}

/// Verify a bearer token against the key named by its `kid` header.
pub async fn verify_access_token(
    pool: &PgPool,
    config: &Config,
    token: &str,
) -> Result<UserClaims, ApiError> {
    let invalid = || ApiError::InvalidToken("The access token is invalid or expired".to_string());

    let key_id = crypto::extract_jwt_kid(token).ok_or_else(invalid)?;
    let public_key = key_management_service::public_key_for(pool, &key_id)
        .await?
        .ok_or_else(|| {
            tracing::debug!(target: "medtag.token", key_id = %key_id, "Unknown signing key id");
            invalid()
        })?;

    crypto::verify_access_token(token, &public_key, config.jwt_clock_skew_seconds)
}

/// Issue an access token and a stored refresh token for `user`.
///
/// `kind` labels the issuance metric (login, register, two_factor).
pub async fn issue_token_pair(
    pool: &PgPool,
    config: &Config,
    user: &User,
    meta: &ClientMeta,
    kind: &str,
) -> Result<TokenPair, ApiError> {
    let start = Instant::now();
    let result = issue_token_pair_inner(pool, config, user, meta).await;

    let status = if result.is_ok() { "success" } else { "error" };
    record_token_issuance(kind, status, start.elapsed());

    result
}

async fn issue_token_pair_inner(
    pool: &PgPool,
    config: &Config,
    user: &User,
    meta: &ClientMeta,
) -> Result<TokenPair, ApiError> {
    let access = issue_access_token(pool, config, user).await?;

    let refresh = crypto::generate_refresh_token()?;
    let expires_at = Utc::now() + Duration::seconds(config.refresh_token_ttl_seconds);
    refresh_tokens::create(
        pool,
        user.user_id,
        &crypto::hash_refresh_token(refresh.expose_secret()),
        expires_at,
        meta.ip_address.as_deref(),
        meta.user_agent.as_deref(),
    )
    .await?;

    tracing::debug!(target: "medtag.token", user_id = %user.user_id, "Issued token pair");

    Ok(TokenPair {
        access,
        refresh: refresh.expose_secret().to_string(),
        user: user.to_info(),
    })
}

/// Exchange a refresh token for a new access token. The refresh token is
/// returned to the caller unchanged and stays valid until it expires.
pub async fn refresh_access_token(
    pool: &PgPool,
    config: &Config,
    refresh: &str,
) -> Result<RefreshResponse, ApiError> {
    let start = Instant::now();
    let result = refresh_access_token_inner(pool, config, refresh).await;

    let status = if result.is_ok() { "success" } else { "error" };
    record_token_issuance("refresh", status, start.elapsed());

    result
}

async fn refresh_access_token_inner(
    pool: &PgPool,
    config: &Config,
    refresh: &str,
) -> Result<RefreshResponse, ApiError> {
    let refresh = refresh.trim();
    if refresh.is_empty() {
        return Err(ApiError::BadRequest("Refresh token is required".to_string()));
    }

    let invalid = || ApiError::InvalidToken(INVALID_REFRESH_MESSAGE.to_string());

    let stored = refresh_tokens::get_by_hash(pool, &crypto::hash_refresh_token(refresh))
        .await?
        .filter(|token| token.is_active)
        .ok_or_else(invalid)?;

    if stored.is_expired(Utc::now()) {
        refresh_tokens::deactivate(pool, stored.token_id).await?;
        tracing::debug!(
            target: "medtag.token",
            user_id = %stored.user_id,
            "Expired refresh token deactivated"
        );
        return Err(invalid());
    }

    let user = users::get_by_id(pool, stored.user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(invalid)?;

    let access = issue_access_token(pool, config, &user).await?;
    Ok(RefreshResponse { access })
}

/// Deactivate `refresh` if it belongs to `user_id`. Returns whether a token
/// was deactivated.
pub async fn revoke_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    refresh: &str,
) -> Result<bool, ApiError> {
    refresh_tokens::deactivate_for_user(pool, user_id, &crypto::hash_refresh_token(refresh.trim()))
        .await
}
