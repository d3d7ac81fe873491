//! Medical profile and sub-resource CRUD over HTTP.

use common::types::Role;
use medtag_test_utils::assertions::assert_api_error;
use medtag_test_utils::server_harness::TestServer;
use medtag_test_utils::test_ids::{TEST_EMAIL_ANNA, TEST_EMAIL_BORIS, TEST_EMAIL_DOCTOR};
use reqwest::StatusCode;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_profile_lifecycle(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/profiles", server.api_url());

    // No profile yet
    let missing = client.get(&url).bearer_auth(&anna.access).send().await?;
    assert_api_error(missing, 404, "NOT_FOUND").await;

    // Act
    let created = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "blood_type": "II+", "height": 168, "weight": 61.5 }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);

    let updated = client
        .put(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "emergency_notes": "Carries an EpiPen" }))
        .send()
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);

    // Assert
    let full: serde_json::Value = client
        .get(&url)
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(full["blood_type"], "II+");
    assert_eq!(full["height"], 168);
    assert_eq!(full["emergency_notes"], "Carries an EpiPen");
    assert_eq!(full["is_public"], true);
    assert_eq!(full["user_name"], "Ivanova Anna");
    assert_eq!(full["allergies"], json!([]));

    let duplicate = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({}))
        .send()
        .await?;
    assert_api_error(duplicate, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_profile_update_null_clears_field(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/profiles", server.api_url());
    let created = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "blood_type": "II+", "height": 170, "weight": 61.5 }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);

    // Act
    let updated = client
        .put(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "blood_type": null, "height": null }))
        .send()
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: serde_json::Value = updated.json().await?;

    // Assert
    assert!(updated["blood_type"].is_null());
    assert!(updated["height"].is_null());
    assert_eq!(updated["weight"], 61.5);
    assert_eq!(updated["is_public"], true);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_profile_rejects_out_of_range_measurements(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/profiles", server.api_url()))
        .bearer_auth(&anna.access)
        .json(&json!({ "height": 400 }))
        .send()
        .await?;

    assert_api_error(response, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_allergy_crud_is_scoped_to_owner(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let boris = server.create_patient(TEST_EMAIL_BORIS).await?;
    server.create_profile(&anna).await?;
    server.create_profile(&boris).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/profiles/allergies", server.api_url());

    // Act
    let created = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "allergen": "Penicillin", "severity": "SEVERE", "reaction": "Anaphylaxis" }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let allergy: serde_json::Value = created.json().await?;
    let allergy_id = allergy["allergy_id"].as_str().unwrap_or_default().to_string();
    let item_url = format!("{}/{}", url, allergy_id);

    // Assert
    let listed: Vec<serde_json::Value> = client
        .get(&url)
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed.len(), 1);

    let foreign = client.get(&item_url).bearer_auth(&boris.access).send().await?;
    assert_api_error(foreign, 404, "NOT_FOUND").await;

    let foreign_delete = client
        .delete(&item_url)
        .bearer_auth(&boris.access)
        .send()
        .await?;
    assert_api_error(foreign_delete, 404, "NOT_FOUND").await;

    let updated = client
        .put(&item_url)
        .bearer_auth(&anna.access)
        .json(&json!({ "allergen": "Penicillin", "severity": "LIFE_THREATENING" }))
        .send()
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: serde_json::Value = updated.json().await?;
    assert_eq!(updated["severity"], "LIFE_THREATENING");

    let deleted = client.delete(&item_url).bearer_auth(&anna.access).send().await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = client.get(&item_url).bearer_auth(&anna.access).send().await?;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sub_resource_requires_profile(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/profiles/medications", server.api_url());

    let listed: Vec<serde_json::Value> = client
        .get(&url)
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert!(listed.is_empty());

    let created = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&json!({ "medication_name": "Salbutamol", "dosage": "100mcg", "frequency": "AS_NEEDED" }))
        .send()
        .await?;
    assert_api_error(created, 400, "BAD_REQUEST").await;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_contacts_and_diseases_appear_in_full_profile(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    server.create_profile(&anna).await?;
    let client = reqwest::Client::new();

    let contact = client
        .post(format!("{}/profiles/emergency-contacts", server.api_url()))
        .bearer_auth(&anna.access)
        .json(&json!({ "full_name": "Ivan Ivanov", "relationship": "SPOUSE", "phone": "+79001112233" }))
        .send()
        .await?;
    assert_eq!(contact.status(), StatusCode::CREATED);

    let disease = client
        .post(format!("{}/profiles/chronic-diseases", server.api_url()))
        .bearer_auth(&anna.access)
        .json(&json!({ "disease_name": "Asthma", "icd_code": "J45" }))
        .send()
        .await?;
    assert_eq!(disease.status(), StatusCode::CREATED);

    let full: serde_json::Value = client
        .get(format!("{}/profiles", server.api_url()))
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(full["emergency_contacts"][0]["priority"], 1);
    assert_eq!(full["chronic_diseases"][0]["icd_code"], "J45");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_doctor_notes_permissions(pool: PgPool) -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestServer::spawn(pool).await?;
    let anna = server.create_patient(TEST_EMAIL_ANNA).await?;
    let doctor = server.create_user(TEST_EMAIL_DOCTOR, Role::MedicalWorker).await?;
    let other_doctor = server
        .create_user("dr.sidorov@clinic.example", Role::MedicalWorker)
        .await?;
    let profile = server.create_profile(&anna).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/profiles/doctor-notes", server.api_url());
    let note_body = json!({
        "profile_id": profile.profile_id,
        "note": "Type 1 diabetic, insulin pump",
        "is_emergency_visible": true
    });

    // Patients cannot write notes
    let by_patient = client
        .post(&url)
        .bearer_auth(&anna.access)
        .json(&note_body)
        .send()
        .await?;
    assert_api_error(by_patient, 403, "FORBIDDEN").await;

    // Act
    let created = client
        .post(&url)
        .bearer_auth(&doctor.access)
        .json(&note_body)
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let note: serde_json::Value = created.json().await?;
    let note_url = format!("{}/{}", url, note["note_id"].as_str().unwrap_or_default());

    // Assert
    let patient_view: Vec<serde_json::Value> = client
        .get(&url)
        .bearer_auth(&anna.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(patient_view.len(), 1);

    let read_by_patient = client.get(&note_url).bearer_auth(&anna.access).send().await?;
    assert_eq!(read_by_patient.status(), StatusCode::OK);

    let edit_by_other = client
        .put(&note_url)
        .bearer_auth(&other_doctor.access)
        .json(&json!({ "note": "Overwritten" }))
        .send()
        .await?;
    assert_api_error(edit_by_other, 403, "FORBIDDEN").await;

    let deleted = client.delete(&note_url).bearer_auth(&doctor.access).send().await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    Ok(())
}
