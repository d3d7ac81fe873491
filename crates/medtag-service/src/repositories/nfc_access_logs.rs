use crate::errors::ApiError;
use chrono::{DateTime, Utc};
use common::api::NfcAccessLog;
use common::types::{AccessStatus, AccessType};
use sqlx::PgPool;
use uuid::Uuid;

const LOG_COLUMNS: &str = r#"
    l.log_id, l.tag_id, l.accessed_by, l.access_type, l.status,
    host(l.ip_address) AS ip_address, l.user_agent, l.device_info,
    l.latitude, l.longitude, l.error_message, l.accessed_at
"#;

/// One tag access attempt.
#[derive(Debug, Clone)]
pub struct NewAccessLog<'a> {
    pub tag_id: Option<Uuid>,
    pub accessed_by: Option<Uuid>,
    pub access_type: AccessType,
    pub status: AccessStatus,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub device_info: Option<&'a str>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub error_message: Option<&'a str>,
}

pub async fn insert(pool: &PgPool, log: &NewAccessLog<'_>) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO nfc_access_logs (
            tag_id, accessed_by, access_type, status, ip_address, user_agent,
            device_info, latitude, longitude, error_message
        )
        VALUES ($1, $2, $3, $4, $5::inet, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(log.tag_id)
    .bind(log.accessed_by)
    .bind(log.access_type)
    .bind(log.status)
    .bind(log.ip_address)
    .bind(log.user_agent)
    .bind(log.device_info)
    .bind(log.latitude)
    .bind(log.longitude)
    .bind(log.error_message)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to write NFC access log: {}", e)))?;

    Ok(())
}

/// Failed scans from one client IP since `since`.
pub async fn count_failed_scans_from_ip(
    pool: &PgPool,
    ip_address: &str,
    since: DateTime<Utc>,
) -> Result<i64, ApiError> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM nfc_access_logs
        WHERE ip_address = $1::inet
            AND access_type = 'SCAN'
            AND status = 'FAILED'
            AND accessed_at > $2
        "#,
    )
    .bind(ip_address)
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to count failed scans: {}", e)))?;

    Ok(count.0)
}

/// Access logs, newest first. `owner` limits to tags owned by that user.
pub async fn list(
    pool: &PgPool,
    owner: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<NfcAccessLog>, ApiError> {
    sqlx::query_as::<_, NfcAccessLog>(&format!(
        r#"
        SELECT {LOG_COLUMNS}
        FROM nfc_access_logs l
        LEFT JOIN nfc_tags t ON t.tag_id = l.tag_id
        WHERE ($1::uuid IS NULL OR t.user_id = $1)
        ORDER BY l.accessed_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(owner)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list NFC access logs: {}", e)))
}
