use crate::errors::ApiError;
use crate::models::SigningKey;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const KEY_COLUMNS: &str = r#"
    key_id, public_key, private_key_encrypted, encryption_nonce, encryption_tag,
    master_key_version, is_active, valid_from, valid_until, created_at
"#;

/// Encrypted key material for a new signing key.
#[derive(Debug, Clone)]
pub struct NewSigningKey<'a> {
    pub key_id: &'a str,
    pub public_key: &'a str,
    pub private_key_encrypted: &'a [u8],
    pub encryption_nonce: &'a [u8],
    pub encryption_tag: &'a [u8],
    pub master_key_version: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Create a new signing key
pub async fn create_signing_key(
    pool: &PgPool,
    key: &NewSigningKey<'_>,
) -> Result<SigningKey, ApiError> {
    let created = sqlx::query_as::<_, SigningKey>(&format!(
        r#"
        INSERT INTO signing_keys (
            key_id, public_key, private_key_encrypted, encryption_nonce, encryption_tag,
            encryption_algorithm, master_key_version, algorithm,
            is_active, valid_from, valid_until
        )
        VALUES ($1, $2, $3, $4, $5, 'AES-256-GCM', $6, 'EdDSA', true, $7, $8)
        RETURNING {KEY_COLUMNS}
        "#
    ))
    .bind(key.key_id)
    .bind(key.public_key)
    .bind(key.private_key_encrypted)
    .bind(key.encryption_nonce)
    .bind(key.encryption_tag)
    .bind(key.master_key_version)
    .bind(key.valid_from)
    .bind(key.valid_until)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create signing key: {}", e)))?;

    Ok(created)
}

/// Get the currently active signing key
pub async fn get_active_key(pool: &PgPool) -> Result<Option<SigningKey>, ApiError> {
    let key = sqlx::query_as::<_, SigningKey>(&format!(
        r#"
        SELECT {KEY_COLUMNS}
        FROM signing_keys
        WHERE is_active = true
            AND valid_from <= NOW()
            AND valid_until > NOW()
        ORDER BY valid_from DESC
        LIMIT 1
        "#
    ))
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch active key: {}", e)))?;

    Ok(key)
}

/// Get an unexpired signing key by key_id, for verifying a token's `kid`.
pub async fn get_by_key_id(pool: &PgPool, key_id: &str) -> Result<Option<SigningKey>, ApiError> {
    let key = sqlx::query_as::<_, SigningKey>(&format!(
        r#"
        SELECT {KEY_COLUMNS}
        FROM signing_keys
        WHERE key_id = $1
            AND valid_until > NOW()
        "#
    ))
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch key by id: {}", e)))?;

    Ok(key)
}
