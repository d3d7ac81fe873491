use crate::errors::ApiError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub async fn record(
    pool: &PgPool,
    email: &str,
    success: bool,
    ip_address: Option<&str>,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO login_attempts (email, success, ip_address)
        VALUES ($1, $2, $3::inet)
        "#,
    )
    .bind(email)
    .bind(success)
    .bind(ip_address)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to record login attempt: {}", e)))?;

    Ok(())
}

/// Count failed attempts for an email since `since`.
pub async fn count_failed_since(
    pool: &PgPool,
    email: &str,
    since: DateTime<Utc>,
) -> Result<i64, ApiError> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM login_attempts
        WHERE email = $1 AND success = false AND created_at > $2
        "#,
    )
    .bind(email)
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to count login attempts: {}", e)))?;

    Ok(count.0)
}
