//! Refresh token storage. Tokens are looked up by their SHA-256 hash.

use crate::errors::ApiError;
use crate::models::RefreshToken;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const TOKEN_COLUMNS: &str = r#"
    token_id, user_id, is_active, expires_at,
    host(ip_address) AS ip_address, device_info, created_at
"#;

pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
    ip_address: Option<&str>,
    device_info: Option<&str>,
) -> Result<RefreshToken, ApiError> {
    let token = sqlx::query_as::<_, RefreshToken>(&format!(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at, ip_address, device_info)
        VALUES ($1, $2, $3, $4::inet, $5)
        RETURNING {TOKEN_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(ip_address)
    .bind(device_info)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to store refresh token: {}", e)))?;

    Ok(token)
}

pub async fn get_by_hash(pool: &PgPool, token_hash: &str) -> Result<Option<RefreshToken>, ApiError> {
    let token = sqlx::query_as::<_, RefreshToken>(&format!(
        "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
    ))
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch refresh token: {}", e)))?;

    Ok(token)
}

pub async fn deactivate(pool: &PgPool, token_id: Uuid) -> Result<(), ApiError> {
    sqlx::query("UPDATE refresh_tokens SET is_active = false WHERE token_id = $1")
        .bind(token_id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to deactivate refresh token: {}", e)))?;

    Ok(())
}

/// Deactivate the token with this hash only if it belongs to `user_id`.
///
/// Returns whether a row was changed.
pub async fn deactivate_for_user(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
) -> Result<bool, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET is_active = false
        WHERE token_hash = $1 AND user_id = $2 AND is_active = true
        "#,
    )
    .bind(token_hash)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to deactivate refresh token: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

/// Deactivate every refresh token of a user. Returns the number deactivated.
pub async fn deactivate_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, ApiError> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET is_active = false WHERE user_id = $1 AND is_active = true",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to deactivate refresh tokens: {}", e)))?;

    Ok(result.rows_affected())
}
