use crate::errors::ApiError;
use common::api::EmergencyAccess;
use sqlx::PgPool;
use uuid::Uuid;

/// One disclosure of emergency data.
#[derive(Debug, Clone)]
pub struct NewEmergencyAccess<'a> {
    pub tag_id: Uuid,
    pub accessed_by: Option<Uuid>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub device_info: Option<&'a str>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub data_accessed: serde_json::Value,
}

pub async fn insert(
    pool: &PgPool,
    access: &NewEmergencyAccess<'_>,
) -> Result<EmergencyAccess, ApiError> {
    sqlx::query_as::<_, EmergencyAccess>(
        r#"
        INSERT INTO emergency_accesses (
            tag_id, accessed_by, ip_address, user_agent, device_info,
            latitude, longitude, data_accessed
        )
        VALUES ($1, $2, $3::inet, $4, $5, $6, $7, $8)
        RETURNING
            access_id, tag_id, accessed_by, host(ip_address) AS ip_address, user_agent,
            device_info, latitude, longitude, data_accessed, accessed_at
        "#,
    )
    .bind(access.tag_id)
    .bind(access.accessed_by)
    .bind(access.ip_address)
    .bind(access.user_agent)
    .bind(access.device_info)
    .bind(access.latitude)
    .bind(access.longitude)
    .bind(&access.data_accessed)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to record emergency access: {}", e)))
}

/// Emergency accesses, newest first. `owner` limits to tags owned by that user.
pub async fn list(
    pool: &PgPool,
    owner: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<EmergencyAccess>, ApiError> {
    sqlx::query_as::<_, EmergencyAccess>(
        r#"
        SELECT
            a.access_id, a.tag_id, a.accessed_by, host(a.ip_address) AS ip_address,
            a.user_agent, a.device_info, a.latitude, a.longitude, a.data_accessed, a.accessed_at
        FROM emergency_accesses a
        JOIN nfc_tags t ON t.tag_id = a.tag_id
        WHERE ($1::uuid IS NULL OR t.user_id = $1)
        ORDER BY a.accessed_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(owner)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list emergency accesses: {}", e)))
}
