//! Audit log repository.

use crate::errors::ApiError;
use common::api::{AuditLog, AuditLogFilter};
use common::types::{AuditAction, AuditSeverity, ResourceType};
use sqlx::PgPool;
use uuid::Uuid;

const AUDIT_COLUMNS: &str = r#"
    log_id, user_id, action, resource_type, resource_id, description, severity,
    host(ip_address) AS ip_address, user_agent, endpoint, method, status_code,
    old_value, new_value, success, error_message, created_at
"#;

/// One audit row.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub description: String,
    pub severity: AuditSeverity,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i32>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewAuditLog {
    /// A successful, LOW severity entry with no request context.
    pub fn new(action: AuditAction, resource_type: ResourceType, description: String) -> Self {
        Self {
            user_id: None,
            action,
            resource_type,
            resource_id: None,
            description,
            severity: AuditSeverity::Low,
            ip_address: None,
            user_agent: None,
            endpoint: None,
            method: None,
            status_code: None,
            old_value: None,
            new_value: None,
            success: true,
            error_message: None,
        }
    }
}

pub async fn insert(pool: &PgPool, log: &NewAuditLog) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (
            user_id, action, resource_type, resource_id, description, severity,
            ip_address, user_agent, endpoint, method, status_code,
            old_value, new_value, success, error_message
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7::inet, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(log.user_id)
    .bind(log.action)
    .bind(log.resource_type)
    .bind(log.resource_id.as_deref())
    .bind(&log.description)
    .bind(log.severity)
    .bind(log.ip_address.as_deref())
    .bind(log.user_agent.as_deref())
    .bind(log.endpoint.as_deref())
    .bind(log.method.as_deref())
    .bind(log.status_code)
    .bind(log.old_value.as_ref())
    .bind(log.new_value.as_ref())
    .bind(log.success)
    .bind(log.error_message.as_deref())
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to write audit log: {}", e)))?;

    Ok(())
}

/// Filtered audit rows, newest first. Absent filters match everything.
pub async fn list(
    pool: &PgPool,
    filter: &AuditLogFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditLog>, ApiError> {
    sqlx::query_as::<_, AuditLog>(&format!(
        r#"
        SELECT {AUDIT_COLUMNS}
        FROM audit_logs
        WHERE ($1::uuid IS NULL OR user_id = $1)
            AND ($2::text IS NULL OR action = $2)
            AND ($3::text IS NULL OR resource_type = $3)
            AND ($4::text IS NULL OR severity = $4)
            AND ($5::boolean IS NULL OR success = $5)
        ORDER BY created_at DESC
        LIMIT $6 OFFSET $7
        "#
    ))
    .bind(filter.user_id)
    .bind(filter.action)
    .bind(filter.resource_type)
    .bind(filter.severity)
    .bind(filter.success)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list audit logs: {}", e)))
}
