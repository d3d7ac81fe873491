//! Medical profile and its sub-resources.
//!
//! Every item is looked up through the caller's own profile, so an id that
//! belongs to someone else is indistinguishable from one that does not
//! exist.

use crate::errors::ApiError;
use crate::models::User;
use crate::repositories::{profiles, users};
use crate::services::user_service::is_valid_email;
use common::api::{
    Allergy, AllergyInput, ChronicDisease, ChronicDiseaseInput, DoctorNote, DoctorNoteInput,
    DoctorNoteUpdate, EmergencyContact, EmergencyContactInput, EmergencyProfile, FullProfile,
    MedicalProfile, Medication, MedicationInput, ProfileInput,
};
use common::types::Role;
use sqlx::PgPool;
use uuid::Uuid;

const MIN_HEIGHT_CM: i32 = 1;
const MAX_HEIGHT_CM: i32 = 300;
const MAX_WEIGHT_KG: f64 = 1000.0;

fn profile_not_found() -> ApiError {
    ApiError::NotFound("Medical profile not found".to_string())
}

fn required(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

pub fn validate_profile_input(input: &ProfileInput) -> Result<(), ApiError> {
    if let Some(Some(height)) = input.height {
        if !(MIN_HEIGHT_CM..=MAX_HEIGHT_CM).contains(&height) {
            return Err(ApiError::BadRequest(format!(
                "Height must be between {} and {} cm",
                MIN_HEIGHT_CM, MAX_HEIGHT_CM
            )));
        }
    }
    if let Some(Some(weight)) = input.weight {
        if !(weight > 0.0 && weight < MAX_WEIGHT_KG) {
            return Err(ApiError::BadRequest(format!(
                "Weight must be greater than 0 and less than {} kg",
                MAX_WEIGHT_KG
            )));
        }
    }
    Ok(())
}

fn validate_allergy(input: &AllergyInput) -> Result<(), ApiError> {
    required(&input.allergen, "Allergen")
}

fn validate_disease(input: &ChronicDiseaseInput) -> Result<(), ApiError> {
    required(&input.disease_name, "Disease name")
}

fn validate_medication(input: &MedicationInput) -> Result<(), ApiError> {
    required(&input.medication_name, "Medication name")?;
    required(&input.dosage, "Dosage")?;
    if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
        if end < start {
            return Err(ApiError::BadRequest(
                "End date cannot be before start date".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_contact(input: &EmergencyContactInput) -> Result<(), ApiError> {
    required(&input.full_name, "Full name")?;
    required(&input.phone, "Phone")?;
    if input.priority < 1 {
        return Err(ApiError::BadRequest("Priority must be at least 1".to_string()));
    }
    if let Some(email) = input.email.as_deref().filter(|e| !e.trim().is_empty()) {
        if !is_valid_email(email.trim()) {
            return Err(ApiError::BadRequest("Invalid email format".to_string()));
        }
    }
    Ok(())
}

/// The caller's profile, or 404.
async fn own_profile(pool: &PgPool, user_id: Uuid) -> Result<MedicalProfile, ApiError> {
    profiles::get_by_user(pool, user_id)
        .await?
        .ok_or_else(profile_not_found)
}

/// The caller's profile for attaching a new item, or 400.
async fn profile_for_new_item(pool: &PgPool, user_id: Uuid) -> Result<MedicalProfile, ApiError> {
    profiles::get_by_user(pool, user_id).await?.ok_or_else(|| {
        ApiError::BadRequest("Create a medical profile first".to_string())
    })
}

// ============================================================================
// Profile
// ============================================================================

pub async fn get_full_profile(pool: &PgPool, user: &User) -> Result<FullProfile, ApiError> {
    let profile = own_profile(pool, user.user_id).await?;
    let profile_id = profile.profile_id;

    Ok(FullProfile {
        user_name: user.full_name(),
        allergies: profiles::list_allergies(pool, profile_id).await?,
        chronic_diseases: profiles::list_diseases(pool, profile_id, false).await?,
        medications: profiles::list_medications(pool, profile_id, false).await?,
        emergency_contacts: profiles::list_contacts(pool, profile_id).await?,
        doctor_notes: profiles::list_notes_for_profile(pool, profile_id, false).await?,
        profile,
    })
}

pub async fn create_profile(
    pool: &PgPool,
    user_id: Uuid,
    input: &ProfileInput,
) -> Result<MedicalProfile, ApiError> {
    validate_profile_input(input)?;
    let profile = profiles::create(pool, user_id, input).await?;
    tracing::info!(
        target: "medtag.profile",
        user_id = %user_id,
        profile_id = %profile.profile_id,
        "Medical profile created"
    );
    Ok(profile)
}

pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    input: &ProfileInput,
) -> Result<MedicalProfile, ApiError> {
    validate_profile_input(input)?;
    let profile = own_profile(pool, user_id).await?;
    profiles::update(pool, profile.profile_id, input).await
}

/// The read-only view served to first responders.
pub async fn emergency_profile(
    pool: &PgPool,
    profile: &MedicalProfile,
) -> Result<EmergencyProfile, ApiError> {
    let profile_id = profile.profile_id;
    let user_name = users::get_by_id(pool, profile.user_id)
        .await?
        .map(|owner| owner.full_name())
        .unwrap_or_default();

    Ok(EmergencyProfile {
        profile_id,
        user_name,
        blood_type: profile.blood_type,
        height: profile.height,
        weight: profile.weight,
        emergency_notes: profile.emergency_notes.clone(),
        allergies: profiles::list_allergies(pool, profile_id).await?,
        chronic_diseases: profiles::list_diseases(pool, profile_id, true).await?,
        medications: profiles::list_medications(pool, profile_id, true).await?,
        emergency_contacts: profiles::list_contacts(pool, profile_id).await?,
        emergency_notes_visible: profiles::list_notes_for_profile(pool, profile_id, true).await?,
    })
}

// ============================================================================
// Allergies
// ============================================================================

/// Empty when the caller has no profile yet.
pub async fn list_allergies(pool: &PgPool, user_id: Uuid) -> Result<Vec<Allergy>, ApiError> {
    match profiles::get_by_user(pool, user_id).await? {
        Some(profile) => profiles::list_allergies(pool, profile.profile_id).await,
        None => Ok(Vec::new()),
    }
}

pub async fn get_allergy(pool: &PgPool, user_id: Uuid, allergy_id: Uuid) -> Result<Allergy, ApiError> {
    let profile = own_profile(pool, user_id).await?;
    profiles::get_allergy(pool, profile.profile_id, allergy_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Allergy not found".to_string()))
}

pub async fn create_allergy(
    pool: &PgPool,
    user_id: Uuid,
    input: &AllergyInput,
) -> Result<Allergy, ApiError> {
    validate_allergy(input)?;
    let profile = profile_for_new_item(pool, user_id).await?;
    profiles::create_allergy(pool, profile.profile_id, input).await
}

pub async fn update_allergy(
    pool: &PgPool,
    user_id: Uuid,
    allergy_id: Uuid,
    input: &AllergyInput,
) -> Result<Allergy, ApiError> {
    validate_allergy(input)?;
    let profile = own_profile(pool, user_id).await?;
    profiles::update_allergy(pool, profile.profile_id, allergy_id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Allergy not found".to_string()))
}

pub async fn delete_allergy(pool: &PgPool, user_id: Uuid, allergy_id: Uuid) -> Result<(), ApiError> {
    let profile = own_profile(pool, user_id).await?;
    if !profiles::delete_allergy(pool, profile.profile_id, allergy_id).await? {
        return Err(ApiError::NotFound("Allergy not found".to_string()));
    }
    Ok(())
}

// ============================================================================
// Chronic diseases
// ============================================================================

pub async fn list_diseases(pool: &PgPool, user_id: Uuid) -> Result<Vec<ChronicDisease>, ApiError> {
    match profiles::get_by_user(pool, user_id).await? {
        Some(profile) => profiles::list_diseases(pool, profile.profile_id, false).await,
        None => Ok(Vec::new()),
    }
}

pub async fn get_disease(
    pool: &PgPool,
    user_id: Uuid,
    disease_id: Uuid,
) -> Result<ChronicDisease, ApiError> {
    let profile = own_profile(pool, user_id).await?;
    profiles::get_disease(pool, profile.profile_id, disease_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chronic disease not found".to_string()))
}

pub async fn create_disease(
    pool: &PgPool,
    user_id: Uuid,
    input: &ChronicDiseaseInput,
) -> Result<ChronicDisease, ApiError> {
    validate_disease(input)?;
    let profile = profile_for_new_item(pool, user_id).await?;
    profiles::create_disease(pool, profile.profile_id, input).await
}

pub async fn update_disease(
    pool: &PgPool,
    user_id: Uuid,
    disease_id: Uuid,
    input: &ChronicDiseaseInput,
) -> Result<ChronicDisease, ApiError> {
    validate_disease(input)?;
    let profile = own_profile(pool, user_id).await?;
    profiles::update_disease(pool, profile.profile_id, disease_id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chronic disease not found".to_string()))
}

pub async fn delete_disease(pool: &PgPool, user_id: Uuid, disease_id: Uuid) -> Result<(), ApiError> {
    let profile = own_profile(pool, user_id).await?;
    if !profiles::delete_disease(pool, profile.profile_id, disease_id).await? {
        return Err(ApiError::NotFound("Chronic disease not found".to_string()));
    }
    Ok(())
}

// ============================================================================
// Medications
// ============================================================================

pub async fn list_medications(pool: &PgPool, user_id: Uuid) -> Result<Vec<Medication>, ApiError> {
    match profiles::get_by_user(pool, user_id).await? {
        Some(profile) => profiles::list_medications(pool, profile.profile_id, false).await,
        None => Ok(Vec::new()),
    }
}

pub async fn get_medication(
    pool: &PgPool,
    user_id: Uuid,
    medication_id: Uuid,
) -> Result<Medication, ApiError> {
    let profile = own_profile(pool, user_id).await?;
    profiles::get_medication(pool, profile.profile_id, medication_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Medication not found".to_string()))
}

pub async fn create_medication(
    pool: &PgPool,
    user_id: Uuid,
    input: &MedicationInput,
) -> Result<Medication, ApiError> {
    validate_medication(input)?;
    let profile = profile_for_new_item(pool, user_id).await?;
    profiles::create_medication(pool, profile.profile_id, input).await
}

pub async fn update_medication(
    pool: &PgPool,
    user_id: Uuid,
    medication_id: Uuid,
    input: &MedicationInput,
) -> Result<Medication, ApiError> {
    validate_medication(input)?;
    let profile = own_profile(pool, user_id).await?;
    profiles::update_medication(pool, profile.profile_id, medication_id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Medication not found".to_string()))
}

pub async fn delete_medication(
    pool: &PgPool,
    user_id: Uuid,
    medication_id: Uuid,
) -> Result<(), ApiError> {
    let profile = own_profile(pool, user_id).await?;
    if !profiles::delete_medication(pool, profile.profile_id, medication_id).await? {
        return Err(ApiError::NotFound("Medication not found".to_string()));
    }
    Ok(())
}

// ============================================================================
// Emergency contacts
// ============================================================================

/// Ordered by priority, 1 first.
pub async fn list_contacts(pool: &PgPool, user_id: Uuid) -> Result<Vec<EmergencyContact>, ApiError> {
    match profiles::get_by_user(pool, user_id).await? {
        Some(profile) => profiles::list_contacts(pool, profile.profile_id).await,
        None => Ok(Vec::new()),
    }
}

pub async fn get_contact(
    pool: &PgPool,
    user_id: Uuid,
    contact_id: Uuid,
) -> Result<EmergencyContact, ApiError> {
    let profile = own_profile(pool, user_id).await?;
    profiles::get_contact(pool, profile.profile_id, contact_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Emergency contact not found".to_string()))
}

pub async fn create_contact(
    pool: &PgPool,
    user_id: Uuid,
    input: &EmergencyContactInput,
) -> Result<EmergencyContact, ApiError> {
    validate_contact(input)?;
    let profile = profile_for_new_item(pool, user_id).await?;
    profiles::create_contact(pool, profile.profile_id, input).await
}

pub async fn update_contact(
    pool: &PgPool,
    user_id: Uuid,
    contact_id: Uuid,
    input: &EmergencyContactInput,
) -> Result<EmergencyContact, ApiError> {
    validate_contact(input)?;
    let profile = own_profile(pool, user_id).await?;
    profiles::update_contact(pool, profile.profile_id, contact_id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Emergency contact not found".to_string()))
}

pub async fn delete_contact(pool: &PgPool, user_id: Uuid, contact_id: Uuid) -> Result<(), ApiError> {
    let profile = own_profile(pool, user_id).await?;
    if !profiles::delete_contact(pool, profile.profile_id, contact_id).await? {
        return Err(ApiError::NotFound("Emergency contact not found".to_string()));
    }
    Ok(())
}

// ============================================================================
// Doctor notes
// ============================================================================

/// Medical workers see the notes they wrote, patients the notes on their
/// own profile. Everyone else gets an empty list.
pub async fn list_notes(pool: &PgPool, user: &User) -> Result<Vec<DoctorNote>, ApiError> {
    match user.role {
        Role::MedicalWorker => profiles::list_notes_by_doctor(pool, user.user_id).await,
        Role::Patient => match profiles::get_by_user(pool, user.user_id).await? {
            Some(profile) => profiles::list_notes_for_profile(pool, profile.profile_id, false).await,
            None => Ok(Vec::new()),
        },
        Role::Admin | Role::SuperAdmin => Ok(Vec::new()),
    }
}

pub async fn create_note(
    pool: &PgPool,
    user: &User,
    input: &DoctorNoteInput,
) -> Result<DoctorNote, ApiError> {
    if user.role != Role::MedicalWorker {
        return Err(ApiError::Forbidden(
            "Only medical workers can write doctor notes".to_string(),
        ));
    }
    required(&input.note, "Note")?;

    let profile = profiles::get_by_id(pool, input.profile_id)
        .await?
        .ok_or_else(profile_not_found)?;

    let note = profiles::create_note(
        pool,
        profile.profile_id,
        user.user_id,
        input.note.trim(),
        input.is_emergency_visible,
    )
    .await?;

    tracing::info!(
        target: "medtag.profile",
        doctor_id = %user.user_id,
        profile_id = %profile.profile_id,
        note_id = %note.note_id,
        "Doctor note created"
    );
    Ok(note)
}

/// 404 for an unknown note, 403 when the caller is not its author.
async fn authored_note(pool: &PgPool, user: &User, note_id: Uuid) -> Result<DoctorNote, ApiError> {
    let note = profiles::get_note(pool, note_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Doctor note not found".to_string()))?;

    if note.doctor_id != Some(user.user_id) {
        return Err(ApiError::Forbidden(
            "Only the author can change this note".to_string(),
        ));
    }
    Ok(note)
}

pub async fn get_note(pool: &PgPool, user: &User, note_id: Uuid) -> Result<DoctorNote, ApiError> {
    let note = profiles::get_note(pool, note_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Doctor note not found".to_string()))?;

    if note.doctor_id == Some(user.user_id) {
        return Ok(note);
    }
    // Patients may read notes on their own profile
    match profiles::get_by_user(pool, user.user_id).await? {
        Some(profile) if profile.profile_id == note.profile_id => Ok(note),
        _ => Err(ApiError::NotFound("Doctor note not found".to_string())),
    }
}

pub async fn update_note(
    pool: &PgPool,
    user: &User,
    note_id: Uuid,
    input: &DoctorNoteUpdate,
) -> Result<DoctorNote, ApiError> {
    required(&input.note, "Note")?;
    authored_note(pool, user, note_id).await?;

    profiles::update_note(
        pool,
        note_id,
        user.user_id,
        input.note.trim(),
        input.is_emergency_visible,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Doctor note not found".to_string()))
}

pub async fn delete_note(pool: &PgPool, user: &User, note_id: Uuid) -> Result<(), ApiError> {
    authored_note(pool, user, note_id).await?;
    if !profiles::delete_note(pool, note_id, user.user_id).await? {
        return Err(ApiError::NotFound("Doctor note not found".to_string()));
    }
    Ok(())
}
