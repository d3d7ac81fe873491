//! Medical profile repository: the profile row, its four item collections
//! and doctor notes.
//!
//! Item queries are always scoped by `profile_id` so one patient can never
//! read or modify another patient's rows by guessing an id.

use crate::errors::ApiError;
use common::api::{
    Allergy, AllergyInput, ChronicDisease, ChronicDiseaseInput, DoctorNote, EmergencyContact,
    EmergencyContactInput, Medication, MedicationInput, MedicalProfile, ProfileInput,
};
use sqlx::PgPool;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = r#"
    profile_id, user_id, blood_type, height, weight, emergency_notes, is_public,
    created_at, updated_at
"#;

const ALLERGY_COLUMNS: &str = r#"
    allergy_id, profile_id, allergen, severity, reaction, notes, diagnosed_date,
    created_at, updated_at
"#;

const DISEASE_COLUMNS: &str = r#"
    disease_id, profile_id, disease_name, icd_code, diagnosis_date, notes, is_active,
    created_at, updated_at
"#;

const MEDICATION_COLUMNS: &str = r#"
    medication_id, profile_id, medication_name, dosage, frequency, start_date, end_date,
    prescribing_doctor, notes, is_active, created_at, updated_at
"#;

const CONTACT_COLUMNS: &str = r#"
    contact_id, profile_id, full_name, relationship, phone, email, priority,
    created_at, updated_at
"#;

const NOTE_SELECT: &str = r#"
    SELECT
        n.note_id, n.profile_id, n.doctor_id,
        CASE WHEN u.user_id IS NULL THEN NULL ELSE u.last_name || ' ' || u.first_name END AS doctor_name,
        n.note, n.is_emergency_visible, n.created_at, n.updated_at
    FROM doctor_notes n
    LEFT JOIN users u ON u.user_id = n.doctor_id
"#;

// ============================================================================
// Profile
// ============================================================================

pub async fn get_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<MedicalProfile>, ApiError> {
    let profile = sqlx::query_as::<_, MedicalProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM medical_profiles WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch profile: {}", e)))?;

    Ok(profile)
}

pub async fn get_by_id(pool: &PgPool, profile_id: Uuid) -> Result<Option<MedicalProfile>, ApiError> {
    let profile = sqlx::query_as::<_, MedicalProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM medical_profiles WHERE profile_id = $1"
    ))
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch profile: {}", e)))?;

    Ok(profile)
}

/// Create the caller's profile. A second profile for the same user is a
/// `BadRequest`.
pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    input: &ProfileInput,
) -> Result<MedicalProfile, ApiError> {
    let profile = sqlx::query_as::<_, MedicalProfile>(&format!(
        r#"
        INSERT INTO medical_profiles (user_id, blood_type, height, weight, emergency_notes, is_public)
        VALUES ($1, $2, $3, $4, COALESCE($5, ''), COALESCE($6, true))
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(input.blood_type.flatten())
    .bind(input.height.flatten())
    .bind(input.weight.flatten())
    .bind(input.emergency_notes.as_ref().and_then(|notes| notes.as_deref()))
    .bind(input.is_public)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::BadRequest("Medical profile already exists".to_string())
        }
        _ => ApiError::Database(format!("Failed to create profile: {}", e)),
    })?;

    Ok(profile)
}

/// Partial update. Each nullable column is bound as a (present, value) pair:
/// absent fields keep their value, explicit nulls clear it.
pub async fn update(
    pool: &PgPool,
    profile_id: Uuid,
    input: &ProfileInput,
) -> Result<MedicalProfile, ApiError> {
    let profile = sqlx::query_as::<_, MedicalProfile>(&format!(
        r#"
        UPDATE medical_profiles
        SET blood_type = CASE WHEN $2 THEN $3 ELSE blood_type END,
            height = CASE WHEN $4 THEN $5 ELSE height END,
            weight = CASE WHEN $6 THEN $7 ELSE weight END,
            emergency_notes = CASE WHEN $8 THEN COALESCE($9, '') ELSE emergency_notes END,
            is_public = COALESCE($10, is_public),
            updated_at = NOW()
        WHERE profile_id = $1
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(profile_id)
    .bind(input.blood_type.is_some())
    .bind(input.blood_type.flatten())
    .bind(input.height.is_some())
    .bind(input.height.flatten())
    .bind(input.weight.is_some())
    .bind(input.weight.flatten())
    .bind(input.emergency_notes.is_some())
    .bind(input.emergency_notes.as_ref().and_then(|notes| notes.as_deref()))
    .bind(input.is_public)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update profile: {}", e)))?
    .ok_or_else(|| ApiError::NotFound("Medical profile not found".to_string()))?;

    Ok(profile)
}

// ============================================================================
// Allergies
// ============================================================================

pub async fn list_allergies(pool: &PgPool, profile_id: Uuid) -> Result<Vec<Allergy>, ApiError> {
    sqlx::query_as::<_, Allergy>(&format!(
        "SELECT {ALLERGY_COLUMNS} FROM allergies WHERE profile_id = $1 ORDER BY created_at"
    ))
    .bind(profile_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list allergies: {}", e)))
}

pub async fn get_allergy(
    pool: &PgPool,
    profile_id: Uuid,
    allergy_id: Uuid,
) -> Result<Option<Allergy>, ApiError> {
    sqlx::query_as::<_, Allergy>(&format!(
        "SELECT {ALLERGY_COLUMNS} FROM allergies WHERE allergy_id = $1 AND profile_id = $2"
    ))
    .bind(allergy_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch allergy: {}", e)))
}

pub async fn create_allergy(
    pool: &PgPool,
    profile_id: Uuid,
    input: &AllergyInput,
) -> Result<Allergy, ApiError> {
    sqlx::query_as::<_, Allergy>(&format!(
        r#"
        INSERT INTO allergies (profile_id, allergen, severity, reaction, notes, diagnosed_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {ALLERGY_COLUMNS}
        "#
    ))
    .bind(profile_id)
    .bind(&input.allergen)
    .bind(input.severity)
    .bind(&input.reaction)
    .bind(&input.notes)
    .bind(input.diagnosed_date)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create allergy: {}", e)))
}

pub async fn update_allergy(
    pool: &PgPool,
    profile_id: Uuid,
    allergy_id: Uuid,
    input: &AllergyInput,
) -> Result<Option<Allergy>, ApiError> {
    sqlx::query_as::<_, Allergy>(&format!(
        r#"
        UPDATE allergies
        SET allergen = $3, severity = $4, reaction = $5, notes = $6, diagnosed_date = $7,
            updated_at = NOW()
        WHERE allergy_id = $1 AND profile_id = $2
        RETURNING {ALLERGY_COLUMNS}
        "#
    ))
    .bind(allergy_id)
    .bind(profile_id)
    .bind(&input.allergen)
    .bind(input.severity)
    .bind(&input.reaction)
    .bind(&input.notes)
    .bind(input.diagnosed_date)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update allergy: {}", e)))
}

pub async fn delete_allergy(
    pool: &PgPool,
    profile_id: Uuid,
    allergy_id: Uuid,
) -> Result<bool, ApiError> {
    let result = sqlx::query("DELETE FROM allergies WHERE allergy_id = $1 AND profile_id = $2")
        .bind(allergy_id)
        .bind(profile_id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to delete allergy: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Chronic diseases
// ============================================================================

pub async fn list_diseases(
    pool: &PgPool,
    profile_id: Uuid,
    active_only: bool,
) -> Result<Vec<ChronicDisease>, ApiError> {
    sqlx::query_as::<_, ChronicDisease>(&format!(
        r#"
        SELECT {DISEASE_COLUMNS}
        FROM chronic_diseases
        WHERE profile_id = $1 AND (is_active OR NOT $2)
        ORDER BY created_at
        "#
    ))
    .bind(profile_id)
    .bind(active_only)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list chronic diseases: {}", e)))
}

pub async fn get_disease(
    pool: &PgPool,
    profile_id: Uuid,
    disease_id: Uuid,
) -> Result<Option<ChronicDisease>, ApiError> {
    sqlx::query_as::<_, ChronicDisease>(&format!(
        "SELECT {DISEASE_COLUMNS} FROM chronic_diseases WHERE disease_id = $1 AND profile_id = $2"
    ))
    .bind(disease_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch chronic disease: {}", e)))
}

pub async fn create_disease(
    pool: &PgPool,
    profile_id: Uuid,
    input: &ChronicDiseaseInput,
) -> Result<ChronicDisease, ApiError> {
    sqlx::query_as::<_, ChronicDisease>(&format!(
        r#"
        INSERT INTO chronic_diseases (profile_id, disease_name, icd_code, diagnosis_date, notes, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {DISEASE_COLUMNS}
        "#
    ))
    .bind(profile_id)
    .bind(&input.disease_name)
    .bind(&input.icd_code)
    .bind(input.diagnosis_date)
    .bind(&input.notes)
    .bind(input.is_active)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create chronic disease: {}", e)))
}

pub async fn update_disease(
    pool: &PgPool,
    profile_id: Uuid,
    disease_id: Uuid,
    input: &ChronicDiseaseInput,
) -> Result<Option<ChronicDisease>, ApiError> {
    sqlx::query_as::<_, ChronicDisease>(&format!(
        r#"
        UPDATE chronic_diseases
        SET disease_name = $3, icd_code = $4, diagnosis_date = $5, notes = $6, is_active = $7,
            updated_at = NOW()
        WHERE disease_id = $1 AND profile_id = $2
        RETURNING {DISEASE_COLUMNS}
        "#
    ))
    .bind(disease_id)
    .bind(profile_id)
    .bind(&input.disease_name)
    .bind(&input.icd_code)
    .bind(input.diagnosis_date)
    .bind(&input.notes)
    .bind(input.is_active)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update chronic disease: {}", e)))
}

pub async fn delete_disease(
    pool: &PgPool,
    profile_id: Uuid,
    disease_id: Uuid,
) -> Result<bool, ApiError> {
    let result =
        sqlx::query("DELETE FROM chronic_diseases WHERE disease_id = $1 AND profile_id = $2")
            .bind(disease_id)
            .bind(profile_id)
            .execute(pool)
            .await
            .map_err(|e| ApiError::Database(format!("Failed to delete chronic disease: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Medications
// ============================================================================

pub async fn list_medications(
    pool: &PgPool,
    profile_id: Uuid,
    active_only: bool,
) -> Result<Vec<Medication>, ApiError> {
    sqlx::query_as::<_, Medication>(&format!(
        r#"
        SELECT {MEDICATION_COLUMNS}
        FROM medications
        WHERE profile_id = $1 AND (is_active OR NOT $2)
        ORDER BY created_at
        "#
    ))
    .bind(profile_id)
    .bind(active_only)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list medications: {}", e)))
}

pub async fn get_medication(
    pool: &PgPool,
    profile_id: Uuid,
    medication_id: Uuid,
) -> Result<Option<Medication>, ApiError> {
    sqlx::query_as::<_, Medication>(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications WHERE medication_id = $1 AND profile_id = $2"
    ))
    .bind(medication_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch medication: {}", e)))
}

pub async fn create_medication(
    pool: &PgPool,
    profile_id: Uuid,
    input: &MedicationInput,
) -> Result<Medication, ApiError> {
    sqlx::query_as::<_, Medication>(&format!(
        r#"
        INSERT INTO medications (
            profile_id, medication_name, dosage, frequency, start_date, end_date,
            prescribing_doctor, notes, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {MEDICATION_COLUMNS}
        "#
    ))
    .bind(profile_id)
    .bind(&input.medication_name)
    .bind(&input.dosage)
    .bind(input.frequency)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(&input.prescribing_doctor)
    .bind(&input.notes)
    .bind(input.is_active)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create medication: {}", e)))
}

pub async fn update_medication(
    pool: &PgPool,
    profile_id: Uuid,
    medication_id: Uuid,
    input: &MedicationInput,
) -> Result<Option<Medication>, ApiError> {
    sqlx::query_as::<_, Medication>(&format!(
        r#"
        UPDATE medications
        SET medication_name = $3, dosage = $4, frequency = $5, start_date = $6, end_date = $7,
            prescribing_doctor = $8, notes = $9, is_active = $10, updated_at = NOW()
        WHERE medication_id = $1 AND profile_id = $2
        RETURNING {MEDICATION_COLUMNS}
        "#
    ))
    .bind(medication_id)
    .bind(profile_id)
    .bind(&input.medication_name)
    .bind(&input.dosage)
    .bind(input.frequency)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(&input.prescribing_doctor)
    .bind(&input.notes)
    .bind(input.is_active)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update medication: {}", e)))
}

pub async fn delete_medication(
    pool: &PgPool,
    profile_id: Uuid,
    medication_id: Uuid,
) -> Result<bool, ApiError> {
    let result =
        sqlx::query("DELETE FROM medications WHERE medication_id = $1 AND profile_id = $2")
            .bind(medication_id)
            .bind(profile_id)
            .execute(pool)
            .await
            .map_err(|e| ApiError::Database(format!("Failed to delete medication: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Emergency contacts
// ============================================================================

/// Contacts in call order: lowest priority number first.
pub async fn list_contacts(
    pool: &PgPool,
    profile_id: Uuid,
) -> Result<Vec<EmergencyContact>, ApiError> {
    sqlx::query_as::<_, EmergencyContact>(&format!(
        r#"
        SELECT {CONTACT_COLUMNS}
        FROM emergency_contacts
        WHERE profile_id = $1
        ORDER BY priority, created_at
        "#
    ))
    .bind(profile_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list emergency contacts: {}", e)))
}

pub async fn get_contact(
    pool: &PgPool,
    profile_id: Uuid,
    contact_id: Uuid,
) -> Result<Option<EmergencyContact>, ApiError> {
    sqlx::query_as::<_, EmergencyContact>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM emergency_contacts WHERE contact_id = $1 AND profile_id = $2"
    ))
    .bind(contact_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch emergency contact: {}", e)))
}

pub async fn create_contact(
    pool: &PgPool,
    profile_id: Uuid,
    input: &EmergencyContactInput,
) -> Result<EmergencyContact, ApiError> {
    sqlx::query_as::<_, EmergencyContact>(&format!(
        r#"
        INSERT INTO emergency_contacts (profile_id, full_name, relationship, phone, email, priority)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {CONTACT_COLUMNS}
        "#
    ))
    .bind(profile_id)
    .bind(&input.full_name)
    .bind(input.relationship)
    .bind(&input.phone)
    .bind(input.email.as_deref())
    .bind(input.priority)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create emergency contact: {}", e)))
}

pub async fn update_contact(
    pool: &PgPool,
    profile_id: Uuid,
    contact_id: Uuid,
    input: &EmergencyContactInput,
) -> Result<Option<EmergencyContact>, ApiError> {
    sqlx::query_as::<_, EmergencyContact>(&format!(
        r#"
        UPDATE emergency_contacts
        SET full_name = $3, relationship = $4, phone = $5, email = $6, priority = $7,
            updated_at = NOW()
        WHERE contact_id = $1 AND profile_id = $2
        RETURNING {CONTACT_COLUMNS}
        "#
    ))
    .bind(contact_id)
    .bind(profile_id)
    .bind(&input.full_name)
    .bind(input.relationship)
    .bind(&input.phone)
    .bind(input.email.as_deref())
    .bind(input.priority)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update emergency contact: {}", e)))
}

pub async fn delete_contact(
    pool: &PgPool,
    profile_id: Uuid,
    contact_id: Uuid,
) -> Result<bool, ApiError> {
    let result =
        sqlx::query("DELETE FROM emergency_contacts WHERE contact_id = $1 AND profile_id = $2")
            .bind(contact_id)
            .bind(profile_id)
            .execute(pool)
            .await
            .map_err(|e| ApiError::Database(format!("Failed to delete emergency contact: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Doctor notes
// ============================================================================

/// Notes on one profile; `emergency_only` limits to emergency-visible notes.
pub async fn list_notes_for_profile(
    pool: &PgPool,
    profile_id: Uuid,
    emergency_only: bool,
) -> Result<Vec<DoctorNote>, ApiError> {
    sqlx::query_as::<_, DoctorNote>(&format!(
        r#"
        {NOTE_SELECT}
        WHERE n.profile_id = $1 AND (n.is_emergency_visible OR NOT $2)
        ORDER BY n.created_at DESC
        "#
    ))
    .bind(profile_id)
    .bind(emergency_only)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list doctor notes: {}", e)))
}

/// Notes written by one doctor across all profiles.
pub async fn list_notes_by_doctor(
    pool: &PgPool,
    doctor_id: Uuid,
) -> Result<Vec<DoctorNote>, ApiError> {
    sqlx::query_as::<_, DoctorNote>(&format!(
        r#"
        {NOTE_SELECT}
        WHERE n.doctor_id = $1
        ORDER BY n.created_at DESC
        "#
    ))
    .bind(doctor_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list doctor notes: {}", e)))
}

pub async fn get_note(pool: &PgPool, note_id: Uuid) -> Result<Option<DoctorNote>, ApiError> {
    sqlx::query_as::<_, DoctorNote>(&format!("{NOTE_SELECT} WHERE n.note_id = $1"))
        .bind(note_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to fetch doctor note: {}", e)))
}

pub async fn create_note(
    pool: &PgPool,
    profile_id: Uuid,
    doctor_id: Uuid,
    note: &str,
    is_emergency_visible: bool,
) -> Result<DoctorNote, ApiError> {
    let note_id: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO doctor_notes (profile_id, doctor_id, note, is_emergency_visible)
        VALUES ($1, $2, $3, $4)
        RETURNING note_id
        "#,
    )
    .bind(profile_id)
    .bind(doctor_id)
    .bind(note)
    .bind(is_emergency_visible)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create doctor note: {}", e)))?;

    get_note(pool, note_id.0)
        .await?
        .ok_or_else(|| ApiError::Database("Doctor note vanished after insert".to_string()))
}

/// Update a note; only rows authored by `doctor_id` match.
pub async fn update_note(
    pool: &PgPool,
    note_id: Uuid,
    doctor_id: Uuid,
    note: &str,
    is_emergency_visible: bool,
) -> Result<Option<DoctorNote>, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE doctor_notes
        SET note = $3, is_emergency_visible = $4, updated_at = NOW()
        WHERE note_id = $1 AND doctor_id = $2
        "#,
    )
    .bind(note_id)
    .bind(doctor_id)
    .bind(note)
    .bind(is_emergency_visible)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update doctor note: {}", e)))?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_note(pool, note_id).await
}

pub async fn delete_note(pool: &PgPool, note_id: Uuid, doctor_id: Uuid) -> Result<bool, ApiError> {
    let result = sqlx::query("DELETE FROM doctor_notes WHERE note_id = $1 AND doctor_id = $2")
        .bind(note_id)
        .bind(doctor_id)
        .execute(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to delete doctor note: {}", e)))?;

    Ok(result.rows_affected() > 0)
}
