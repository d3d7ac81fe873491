//! Request auditing and the audit read endpoints.

use common::types::Role;
use medtag_service::middleware::audit::REDACTED;
use medtag_test_utils::assertions::assert_api_error;
use medtag_test_utils::server_harness::TestServer;
use medtag_test_utils::test_ids::{
    TEST_EMAIL_ADMIN, TEST_EMAIL_ANNA, TEST_PASSWORD, TEST_SCANNER_IP,
};
use reqwest::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

type AuditRow = (
    Option<Uuid>,
    String,
    String,
    Option<i32>,
    bool,
    Option<serde_json::Value>,
    Option<String>,
);

async fn audit_row(
    pool: &PgPool,
    method: &str,
    endpoint: &str,
) -> Result<AuditRow, anyhow::Error> {
    let row = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT user_id, action, severity, status_code, success, new_value, host(ip_address)
        FROM audit_logs
        WHERE method = $1 AND endpoint = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(method)
    .bind(endpoint)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_request_body_is_audited_with_credentials_masked(
    pool: PgPool,
) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    server.create_patient(TEST_EMAIL_ANNA).await?;

    // Act
    let response = reqwest::Client::new()
        .post(format!("{}/auth/login", server.api_url()))
        .header("X-Forwarded-For", TEST_SCANNER_IP)
        .json(&json!({ "email": TEST_EMAIL_ANNA, "password": TEST_PASSWORD }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Assert
    let (_, action, severity, status_code, success, new_value, ip) =
        audit_row(server.pool(), "POST", "/api/v1/auth/login").await?;
    assert_eq!(action, "CREATE");
    assert_eq!(severity, "LOW");
    assert_eq!(status_code, Some(200));
    assert!(success);
    assert_eq!(ip.as_deref(), Some(TEST_SCANNER_IP));

    let body = new_value.ok_or_else(|| anyhow::anyhow!("request body not captured"))?;
    assert_eq!(body["email"], TEST_EMAIL_ANNA);
    assert_eq!(body["password"], REDACTED);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_authenticated_request_attributed_to_user(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;

    let response = reqwest::Client::new()
        .delete(format!(
            "{}/profiles/allergies/{}",
            server.api_url(),
            Uuid::new_v4()
        ))
        .bearer_auth(&anna.access)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let path = response.url().path().to_string();
    let (user_id, action, severity, status_code, success, _, _) =
        audit_row(server.pool(), "DELETE", &path).await?;
    assert_eq!(user_id, Some(anna.user.user_id));
    assert_eq!(action, "DELETE");
    assert_eq!(severity, "HIGH");
    assert_eq!(status_code, Some(404));
    assert!(!success);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_my_logs_lists_only_own_rows(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();

    let me = client
        .get(format!("{}/auth/me", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?;
    assert_eq!(me.status(), StatusCode::OK);

    let logs: Vec<serde_json::Value> = client
        .get(format!("{}/audit/my-logs?limit=10", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;

    assert!(!logs.is_empty());
    assert!(logs
        .iter()
        .all(|log| log["user_id"] == anna.user.user_id.to_string()));
    // Reading the audit trail is not itself audited
    assert!(logs
        .iter()
        .all(|log| !log["endpoint"].as_str().unwrap_or_default().starts_with("/api/v1/audit")));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_admin_audit_endpoints_require_admin(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let admin = server.create_user(TEST_EMAIL_ADMIN, Role::Admin).await?;
    let client = reqwest::Client::new();

    // Act / Assert - patients are refused
    let refused = client
        .get(format!("{}/audit/logs", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?;
    assert_api_error(refused, 403, "FORBIDDEN").await;

    let unauthenticated = client
        .get(format!("{}/audit/security-events", server.api_url()))
        .send()
        .await?;
    assert_api_error(unauthenticated, 401, "INVALID_TOKEN").await;

    // Admins can filter the full trail
    let logs = client
        .get(format!(
            "{}/audit/logs?user_id={}&limit=5",
            server.api_url(),
            anna.user.user_id
        ))
        .bearer_auth(&admin.access)
        .send()
        .await?;
    assert_eq!(logs.status(), StatusCode::OK);
    let logs: Vec<serde_json::Value> = logs.json().await?;
    assert!(logs
        .iter()
        .all(|log| log["user_id"] == anna.user.user_id.to_string()));

    let events = client
        .get(format!(
            "{}/audit/security-events?is_resolved=false",
            server.api_url()
        ))
        .bearer_auth(&admin.access)
        .send()
        .await?;
    assert_eq!(events.status(), StatusCode::OK);
    Ok(())
}
