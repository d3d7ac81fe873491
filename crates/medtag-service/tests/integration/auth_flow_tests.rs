//! Account lifecycle over HTTP: registration, login, refresh, logout,
//! lockout and two-factor authentication.

use chrono::Utc;
use common::api::TokenPair;
use common::secret::ExposeSecret;
use medtag_service::crypto::totp;
use medtag_service::repositories::totp_devices;
use medtag_service::services::two_factor_service;
use medtag_test_utils::assertions::{assert_api_error, AccessTokenAssertions};
use medtag_test_utils::server_harness::TestServer;
use medtag_test_utils::test_ids::{TEST_EMAIL_ANNA, TEST_PASSWORD, TEST_SCANNER_IP};
use reqwest::StatusCode;
use serde_json::json;
use sqlx::PgPool;

fn registration(email: &str) -> serde_json::Value {
    json!({
        "email": email,
        "password": TEST_PASSWORD,
        "password_confirm": TEST_PASSWORD,
        "first_name": "Anna",
        "last_name": "Ivanova",
        "middle_name": "Sergeevna"
    })
}

async fn register(server: &TestServer, email: &str) -> Result<TokenPair, anyhow::Error> {
    let response = reqwest::Client::new()
        .post(format!("{}/auth/register", server.api_url()))
        .json(&registration(email))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(response.json().await?)
}

async fn login(
    server: &TestServer,
    email: &str,
    password: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .post(format!("{}/auth/login", server.api_url()))
        .header("X-Forwarded-For", TEST_SCANNER_IP)
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_issues_token_pair(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;

    // Act
    let pair = register(&server, "  anna@Example.COM ").await?;

    // Assert
    assert_eq!(pair.user.email, TEST_EMAIL_ANNA, "Email should be trimmed with a lowercase domain");
    assert_eq!(pair.user.full_name, "Ivanova Anna Sergeevna");
    pair.access
        .assert_valid_jwt()
        .assert_for_subject(&pair.user.user_id.to_string())
        .assert_role("PATIENT")
        .assert_lifetime(server.config().access_token_ttl_seconds);
    assert!(!pair.refresh.is_empty());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_keeps_local_part_case(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;

    let pair = register(&server, "Anna@Example.COM").await?;

    assert_eq!(pair.user.email, "Anna@example.com");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_duplicate_email_conflict(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    register(&server, TEST_EMAIL_ANNA).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/auth/register", server.api_url()))
        .json(&registration(TEST_EMAIL_ANNA))
        .send()
        .await?;

    assert_api_error(response, 409, "CONFLICT").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_weak_password_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/auth/register", server.api_url()))
        .json(&json!({
            "email": TEST_EMAIL_ANNA,
            "password": "12345678",
            "password_confirm": "12345678",
            "first_name": "Anna",
            "last_name": "Ivanova"
        }))
        .send()
        .await?;

    let body = assert_api_error(response, 400, "BAD_REQUEST").await;
    assert!(body.error.message.contains("numeric"));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_login_with_valid_credentials(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    register(&server, TEST_EMAIL_ANNA).await?;

    let response = login(&server, TEST_EMAIL_ANNA, TEST_PASSWORD).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let pair: TokenPair = response.json().await?;
    pair.access.assert_valid_jwt().assert_role("PATIENT");
    assert!(pair.user.last_login.is_some());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_login_wrong_password_unauthorized(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    register(&server, TEST_EMAIL_ANNA).await?;

    let response = login(&server, TEST_EMAIL_ANNA, "wrong password").await?;
    assert_api_error(response, 401, "INVALID_CREDENTIALS").await;

    // Unknown accounts look identical
    let response = login(&server, "nobody@example.com", TEST_PASSWORD).await?;
    assert_api_error(response, 401, "INVALID_CREDENTIALS").await;

    let (failed_events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM security_events WHERE event_type = 'FAILED_LOGIN' AND host(ip_address) = $1",
    )
    .bind(TEST_SCANNER_IP)
    .fetch_one(server.pool())
    .await?;
    assert_eq!(failed_events, 2);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_login_lockout_after_repeated_failures(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    register(&server, TEST_EMAIL_ANNA).await?;
    for _ in 0..5 {
        let response = login(&server, TEST_EMAIL_ANNA, "wrong password").await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Act - even the right password is refused while locked out
    let response = login(&server, TEST_EMAIL_ANNA, TEST_PASSWORD).await?;

    // Assert
    assert_eq!(
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok()),
        Some("900")
    );
    assert_api_error(response, 429, "RATE_LIMIT_EXCEEDED").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_refresh_issues_new_access_token(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let pair = register(&server, TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/refresh", server.api_url()))
        .json(&json!({ "refresh": pair.refresh }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    let access = body["access"].as_str().unwrap_or_default().to_string();
    access
        .assert_valid_jwt()
        .assert_for_subject(&pair.user.user_id.to_string());

    let me = client
        .get(format!("{}/auth/me", server.api_url()))
        .bearer_auth(&access)
        .send()
        .await?;
    assert_eq!(me.status(), StatusCode::OK);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_logout_revokes_refresh_token(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let pair = register(&server, TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/auth/logout", server.api_url()))
        .bearer_auth(&pair.access)
        .json(&json!({ "refresh": pair.refresh }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Assert
    let refresh = client
        .post(format!("{}/auth/refresh", server.api_url()))
        .json(&json!({ "refresh": pair.refresh }))
        .send()
        .await?;
    assert_api_error(refresh, 401, "INVALID_TOKEN").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_logout_without_body_succeeds(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let pair = register(&server, TEST_EMAIL_ANNA).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/auth/logout", server.api_url()))
        .bearer_auth(&pair.access)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_protected_route_rejects_bad_token(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("{}/auth/me", server.api_url()))
        .send()
        .await?;
    assert!(missing.headers().contains_key("www-authenticate"));
    assert_api_error(missing, 401, "INVALID_TOKEN").await;

    let garbage = client
        .get(format!("{}/auth/me", server.api_url()))
        .header("X-Forwarded-For", TEST_SCANNER_IP)
        .bearer_auth("not-a-valid-jwt-token")
        .send()
        .await?;
    assert_api_error(garbage, 401, "INVALID_TOKEN").await;

    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM security_events WHERE event_type = 'INVALID_TOKEN' AND endpoint = '/api/v1/auth/me'",
    )
    .fetch_one(server.pool())
    .await?;
    assert!(events >= 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_update_me_and_change_password(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let pair = register(&server, TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();

    let updated = client
        .patch(format!("{}/auth/me", server.api_url()))
        .bearer_auth(&pair.access)
        .json(&json!({ "phone": "+79001234567" }))
        .send()
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let info: serde_json::Value = updated.json().await?;
    assert_eq!(info["phone"], "+79001234567");
    assert_eq!(info["first_name"], "Anna");

    let changed = client
        .post(format!("{}/auth/change-password", server.api_url()))
        .bearer_auth(&pair.access)
        .json(&json!({
            "old_password": TEST_PASSWORD,
            "new_password": "a much better passphrase",
            "new_password_confirm": "a much better passphrase"
        }))
        .send()
        .await?;
    assert_eq!(changed.status(), StatusCode::OK);

    let old = login(&server, TEST_EMAIL_ANNA, TEST_PASSWORD).await?;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    let new = login(&server, TEST_EMAIL_ANNA, "a much better passphrase").await?;
    assert_eq!(new.status(), StatusCode::OK);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_two_factor_login_flow(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange - enable 2FA
    let server = TestServer::spawn(pool).await?;
    let pair = register(&server, TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();

    let setup = client
        .get(format!("{}/auth/2fa/enable", server.api_url()))
        .bearer_auth(&pair.access)
        .send()
        .await?;
    assert_eq!(setup.status(), StatusCode::OK);
    let setup: serde_json::Value = setup.json().await?;
    assert!(setup["otpauth_url"]
        .as_str()
        .is_some_and(|url| url.starts_with("otpauth://totp/")));
    // Rendering the provisioning URI as an image is left to the client
    assert!(setup.get("qr_code").is_none());

    let device = totp_devices::get(server.pool(), pair.user.user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("TOTP device missing"))?;
    let secret =
        two_factor_service::decrypt_secret(device, server.config().master_key.expose_secret())?;
    let code = totp::code_at(
        &secret,
        (Utc::now().timestamp() / totp::TOTP_STEP_SECONDS) as u64,
    )?;

    let confirm = client
        .post(format!("{}/auth/2fa/enable", server.api_url()))
        .bearer_auth(&pair.access)
        .json(&json!({ "otp_code": code }))
        .send()
        .await?;
    assert_eq!(confirm.status(), StatusCode::OK);

    // Act - password login now yields a challenge
    let challenge = login(&server, TEST_EMAIL_ANNA, TEST_PASSWORD).await?;
    assert_eq!(challenge.status(), StatusCode::OK);
    let challenge: serde_json::Value = challenge.json().await?;
    assert_eq!(challenge["requires_2fa"], true);
    assert!(challenge.get("access").is_none());

    let wrong = client
        .post(format!("{}/auth/2fa/verify", server.api_url()))
        .json(&json!({ "user_id": pair.user.user_id, "otp_code": "000000x" }))
        .send()
        .await?;
    assert_api_error(wrong, 400, "BAD_REQUEST").await;

    let verified = client
        .post(format!("{}/auth/2fa/verify", server.api_url()))
        .json(&json!({ "user_id": pair.user.user_id, "otp_code": code }))
        .send()
        .await?;

    // Assert
    assert_eq!(verified.status(), StatusCode::OK);
    let tokens: TokenPair = verified.json().await?;
    tokens.access.assert_valid_jwt();
    assert!(tokens.user.two_factor_enabled);
    Ok(())
}
