//! Tag registration, scanning, QR access and revocation over HTTP.

use common::api::{NfcData, ScanResponse};
use common::types::Role;
use medtag_test_utils::assertions::assert_api_error;
use medtag_test_utils::fixtures::TestUser;
use medtag_test_utils::server_harness::TestServer;
use medtag_test_utils::test_ids::{
    TEST_EMAIL_ANNA, TEST_EMAIL_BORIS, TEST_EMAIL_DOCTOR, TEST_SCANNER_IP, TEST_TAG_UID_1,
    TEST_TAG_UID_2,
};
use reqwest::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

fn scan_body(tag_uid: &str, nfc_data: &NfcData) -> serde_json::Value {
    json!({
        "tag_uid": tag_uid,
        "public_key_id": nfc_data.public_key_id,
        "checksum": nfc_data.checksum,
        "latitude": 55.7558,
        "longitude": 37.6173,
        "device_info": "Pixel 8 / Android 15"
    })
}

async fn scan(
    server: &TestServer,
    body: &serde_json::Value,
    bearer: Option<&str>,
) -> Result<reqwest::Response, anyhow::Error> {
    let mut request = reqwest::Client::new()
        .post(format!("{}/nfc/scan", server.api_url()))
        .header("X-Forwarded-For", TEST_SCANNER_IP)
        .json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    Ok(request.send().await?)
}

/// Patient with a profile holding one allergy and one registered tag.
async fn patient_with_tag(server: &TestServer) -> Result<(TestUser, NfcData), anyhow::Error> {
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    server.create_profile(&anna).await?;

    let allergy = reqwest::Client::new()
        .post(format!("{}/profiles/allergies", server.api_url()))
        .bearer_auth(&anna.access)
        .json(&json!({ "allergen": "Penicillin", "severity": "LIFE_THREATENING" }))
        .send()
        .await?;
    assert_eq!(allergy.status(), StatusCode::CREATED);

    let registered = server.register_tag(&anna, TEST_TAG_UID_1).await?;
    Ok((anna, registered.nfc_data))
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_tag_over_http(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/nfc/register", server.api_url());

    // A profile is required first
    let early = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "tag_uid": TEST_TAG_UID_2 }))
        .send()
        .await?;
    assert_api_error(early, 400, "BAD_REQUEST").await;
    server.create_profile(&anna).await?;

    // Act
    let response = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "tag_uid": TEST_TAG_UID_2 }))
        .send()
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["tag"]["status"], "ACTIVE");
    assert_eq!(body["tag"]["tag_type"], "NTAG215");
    assert_eq!(body["nfc_data"]["checksum"].as_str().map(str::len), Some(64));

    let duplicate = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "tag_uid": TEST_TAG_UID_2 }))
        .send()
        .await?;
    assert_api_error(duplicate, 409, "CONFLICT").await;

    let tags: Vec<serde_json::Value> = client
        .get(format!("{}/nfc/tags", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(tags.len(), 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_returns_emergency_profile(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let (anna, nfc_data) = patient_with_tag(&server).await?;

    // Act - anonymous first responder
    let response = scan(&server, &scan_body(TEST_TAG_UID_1, &nfc_data), None).await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body: ScanResponse = response.json().await?;
    assert_eq!(body.message, "Emergency medical data retrieved");
    assert_eq!(body.profile.user_name, "Ivanova Anna");
    assert_eq!(body.profile.allergies.len(), 1);

    let (scan_count,): (i64,) = sqlx::query_as("SELECT scan_count FROM nfc_tags WHERE tag_id = $1")
        .bind(nfc_data.tag_id)
        .fetch_one(server.pool())
        .await?;
    assert_eq!(scan_count, 1);

    let accesses: Vec<serde_json::Value> = reqwest::Client::new()
        .get(format!("{}/nfc/emergency-accesses", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(accesses.len(), 1);
    assert_eq!(accesses[0]["ip_address"], TEST_SCANNER_IP);
    assert!(accesses[0]["accessed_by"].is_null());
    assert_eq!(
        accesses[0]["data_accessed"]["allergies"].as_array().map(Vec::len),
        Some(1)
    );
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_attributes_authenticated_scanner(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (anna, nfc_data) = patient_with_tag(&server).await?;
    let doctor = server.create_user(TEST_EMAIL_DOCTOR, Role::MedicalWorker).await?;

    let response = scan(
        &server,
        &scan_body(TEST_TAG_UID_1, &nfc_data),
        Some(&doctor.access),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let logs: Vec<serde_json::Value> = reqwest::Client::new()
        .get(format!("{}/nfc/access-logs", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    let scan_log = logs
        .iter()
        .find(|log| log["access_type"] == "SCAN")
        .ok_or_else(|| anyhow::anyhow!("scan log missing"))?;
    assert_eq!(scan_log["status"], "SUCCESS");
    assert_eq!(scan_log["accessed_by"], doctor.user.user_id.to_string());
    assert_eq!(scan_log["device_info"], "Pixel 8 / Android 15");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_with_forged_checksum_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;
    let mut body = scan_body(TEST_TAG_UID_1, &nfc_data);
    body["checksum"] = json!("00".repeat(32));

    let response = scan(&server, &body, None).await?;

    assert_api_error(response, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_with_wrong_key_id_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;
    let mut body = scan_body(TEST_TAG_UID_1, &nfc_data);
    body["public_key_id"] = json!(Uuid::new_v4());

    let response = scan(&server, &body, None).await?;

    assert_api_error(response, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_unknown_tag_not_found(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;

    let response = scan(&server, &scan_body("04FFFFFFFFFFFF", &nfc_data), None).await?;

    assert_api_error(response, 404, "NOT_FOUND").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_rejects_invalid_coordinates(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;
    let mut body = scan_body(TEST_TAG_UID_1, &nfc_data);
    body["latitude"] = json!(91.0);

    let response = scan(&server, &body, None).await?;

    assert_api_error(response, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_private_profile_denied(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let (anna, nfc_data) = patient_with_tag(&server).await?;
    let hidden = reqwest::Client::new()
        .put(format!("{}/profiles", server.api_url()))
        .bearer_auth(&anna.access)
        .json(&json!({ "is_public": false }))
        .send()
        .await?;
    assert_eq!(hidden.status(), StatusCode::OK);

    // Act
    let response = scan(&server, &scan_body(TEST_TAG_UID_1, &nfc_data), None).await?;

    // Assert
    assert_api_error(response, 403, "FORBIDDEN").await;
    let (denied,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM nfc_access_logs WHERE tag_id = $1 AND status = 'DENIED'",
    )
    .bind(nfc_data.tag_id)
    .fetch_one(server.pool())
    .await?;
    assert_eq!(denied, 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_revoked_tag_is_gone_for_scan_and_qr(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let (anna, nfc_data) = patient_with_tag(&server).await?;
    let boris = server.create_patient(TEST_EMAIL_BORIS).await?;
    let client = reqwest::Client::new();
    let revoke_url = format!("{}/nfc/revoke", server.api_url());

    // Someone else's tag looks like an unknown one
    let foreign = client
        .post(&revoke_url)
        .bearer_auth(&boris.access)
        .json(&json!({ "tag_id": nfc_data.tag_id, "reason": "not mine" }))
        .send()
        .await?;
    assert_api_error(foreign, 404, "NOT_FOUND").await;

    // Act
    let revoked = client
        .post(&revoke_url)
        .bearer_auth(&anna.access)
        .json(&json!({ "tag_id": nfc_data.tag_id, "reason": "Lost at the gym" }))
        .send()
        .await?;
    assert_eq!(revoked.status(), StatusCode::OK);
    let revoked: serde_json::Value = revoked.json().await?;
    assert_eq!(revoked["tag"]["status"], "REVOKED");
    assert_eq!(revoked["tag"]["revoked_reason"], "Lost at the gym");

    // Assert
    let scanned = scan(&server, &scan_body(TEST_TAG_UID_1, &nfc_data), None).await?;
    assert_api_error(scanned, 410, "TAG_INACTIVE").await;

    let qr = client
        .get(format!("{}/nfc/emergency/{}", server.api_url(), nfc_data.tag_id))
        .send()
        .await?;
    assert_api_error(qr, 404, "NOT_FOUND").await;

    let again = client
        .post(&revoke_url)
        .bearer_auth(&anna.access)
        .json(&json!({ "tag_id": nfc_data.tag_id }))
        .send()
        .await?;
    assert_api_error(again, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_qr_emergency_access(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/nfc/emergency/{}", server.api_url(), nfc_data.tag_id))
        .header("X-Forwarded-For", TEST_SCANNER_IP)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: ScanResponse = response.json().await?;
    assert_eq!(body.profile.allergies.len(), 1);

    let unknown = client
        .get(format!("{}/nfc/emergency/{}", server.api_url(), Uuid::new_v4()))
        .send()
        .await?;
    assert_api_error(unknown, 404, "NOT_FOUND").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_scan_rate_limited_after_repeated_failures(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;
    let unknown_tag = scan_body("04DEADBEEF0000", &nfc_data);
    for _ in 0..20 {
        let response = scan(&server, &unknown_tag, None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // Act - a valid scan from the same address is refused
    let response = scan(&server, &scan_body(TEST_TAG_UID_1, &nfc_data), None).await?;

    // Assert
    assert!(response.headers().contains_key("retry-after"));
    assert_api_error(response, 429, "RATE_LIMIT_EXCEEDED").await;

    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM security_events WHERE event_type = 'RATE_LIMIT_EXCEEDED'",
    )
    .fetch_one(server.pool())
    .await?;
    assert_eq!(events, 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_malformed_scan_body_is_enveloped_and_logged(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let body = json!({
        "tag_uid": TEST_TAG_UID_1,
        "public_key_id": "not-a-uuid",
        "checksum": "00"
    });

    // Act
    let response = scan(&server, &body, None).await?;

    // Assert
    let error = assert_api_error(response, 400, "BAD_REQUEST").await;
    assert!(error.error.message.starts_with("Invalid request body"));

    let (failed,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM nfc_access_logs \
         WHERE access_type = 'SCAN' AND status = 'FAILED' AND host(ip_address) = $1",
    )
    .bind(TEST_SCANNER_IP)
    .fetch_one(server.pool())
    .await?;
    assert_eq!(failed, 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_malformed_scans_count_toward_rate_limit(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let (_anna, nfc_data) = patient_with_tag(&server).await?;
    let missing_checksum = json!({ "tag_uid": TEST_TAG_UID_1, "public_key_id": nfc_data.public_key_id });

    for _ in 0..20 {
        let response = scan(&server, &missing_checksum, None).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = scan(&server, &scan_body(TEST_TAG_UID_1, &nfc_data), None).await?;
    assert_api_error(response, 429, "RATE_LIMIT_EXCEEDED").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_qr_with_malformed_tag_id_is_enveloped(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;

    let response = reqwest::get(format!("{}/nfc/emergency/not-a-uuid", server.api_url())).await?;

    let error = assert_api_error(response, 400, "BAD_REQUEST").await;
    assert!(error.error.message.starts_with("Invalid path parameter"));
    Ok(())
}
