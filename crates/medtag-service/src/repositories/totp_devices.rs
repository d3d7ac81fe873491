use crate::errors::ApiError;
use crate::models::TotpDevice;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<Option<TotpDevice>, ApiError> {
    let device = sqlx::query_as::<_, TotpDevice>(
        r#"
        SELECT user_id, secret_encrypted, encryption_nonce, encryption_tag, confirmed, created_at
        FROM totp_devices
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch TOTP device: {}", e)))?;

    Ok(device)
}

/// Store a fresh unconfirmed secret, replacing any previous device.
pub async fn upsert_unconfirmed(
    pool: &PgPool,
    user_id: Uuid,
    secret_encrypted: &[u8],
    encryption_nonce: &[u8],
    encryption_tag: &[u8],
) -> Result<TotpDevice, ApiError> {
    let device = sqlx::query_as::<_, TotpDevice>(
        r#"
        INSERT INTO totp_devices (user_id, secret_encrypted, encryption_nonce, encryption_tag, confirmed)
        VALUES ($1, $2, $3, $4, false)
        ON CONFLICT (user_id) DO UPDATE
        SET secret_encrypted = EXCLUDED.secret_encrypted,
            encryption_nonce = EXCLUDED.encryption_nonce,
            encryption_tag = EXCLUDED.encryption_tag,
            confirmed = false,
            created_at = NOW()
        RETURNING user_id, secret_encrypted, encryption_nonce, encryption_tag, confirmed, created_at
        "#,
    )
    .bind(user_id)
    .bind(secret_encrypted)
    .bind(encryption_nonce)
    .bind(encryption_tag)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to store TOTP device: {}", e)))?;

    Ok(device)
}

pub async fn confirm(pool: &PgPool, user_id: Uuid) -> Result<(), ApiError> {
    sqlx::query("UPDATE totp_devices SET confirmed = true WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to confirm TOTP device: {}", e)))?;

    Ok(())
}
