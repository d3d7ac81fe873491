use crate::errors::ApiError;
use common::api::{SecurityEvent, SecurityEventFilter};
use common::types::{SecurityEventType, SecuritySeverity};
use sqlx::PgPool;
use uuid::Uuid;

const EVENT_COLUMNS: &str = r#"
    event_id, event_type, severity, user_id, host(ip_address) AS ip_address, user_agent,
    endpoint, description, additional_data, action_taken, is_resolved, resolved_at, created_at
"#;

#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: SecuritySeverity,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub description: String,
    pub additional_data: Option<serde_json::Value>,
    pub action_taken: String,
}

impl NewSecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        severity: SecuritySeverity,
        description: String,
    ) -> Self {
        Self {
            event_type,
            severity,
            user_id: None,
            ip_address: None,
            user_agent: None,
            endpoint: None,
            description,
            additional_data: None,
            action_taken: String::new(),
        }
    }
}

pub async fn insert(pool: &PgPool, event: &NewSecurityEvent) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO security_events (
            event_type, severity, user_id, ip_address, user_agent, endpoint,
            description, additional_data, action_taken
        )
        VALUES ($1, $2, $3, $4::inet, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.event_type)
    .bind(event.severity)
    .bind(event.user_id)
    .bind(event.ip_address.as_deref())
    .bind(event.user_agent.as_deref())
    .bind(event.endpoint.as_deref())
    .bind(&event.description)
    .bind(event.additional_data.as_ref())
    .bind(&event.action_taken)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to write security event: {}", e)))?;

    Ok(())
}

pub async fn list(
    pool: &PgPool,
    filter: &SecurityEventFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<SecurityEvent>, ApiError> {
    sqlx::query_as::<_, SecurityEvent>(&format!(
        r#"
        SELECT {EVENT_COLUMNS}
        FROM security_events
        WHERE ($1::text IS NULL OR event_type = $1)
            AND ($2::text IS NULL OR severity = $2)
            AND ($3::boolean IS NULL OR is_resolved = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(filter.event_type)
    .bind(filter.severity)
    .bind(filter.is_resolved)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list security events: {}", e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_insert_and_filter_by_type(pool: PgPool) -> Result<(), ApiError> {
        let mut failed = NewSecurityEvent::new(
            SecurityEventType::FailedLogin,
            SecuritySeverity::Warning,
            "Failed login".to_string(),
        );
        failed.ip_address = Some("203.0.113.50".to_string());
        insert(&pool, &failed).await?;
        insert(
            &pool,
            &NewSecurityEvent::new(
                SecurityEventType::BruteForceAttempt,
                SecuritySeverity::Danger,
                "Lockout".to_string(),
            ),
        )
        .await?;

        let brute = list(
            &pool,
            &SecurityEventFilter {
                event_type: Some(SecurityEventType::BruteForceAttempt),
                ..SecurityEventFilter::default()
            },
            100,
            0,
        )
        .await?;
        assert_eq!(brute.len(), 1);
        assert_eq!(brute.first().unwrap().severity, SecuritySeverity::Danger);

        let unresolved = list(
            &pool,
            &SecurityEventFilter {
                is_resolved: Some(false),
                ..SecurityEventFilter::default()
            },
            100,
            0,
        )
        .await?;
        assert_eq!(unresolved.len(), 2);
        Ok(())
    }
}
