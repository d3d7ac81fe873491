//! `/api/v1/profiles` handlers. Every route acts on the caller's own
//! profile; items of other users are reported as not found.

use crate::errors::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::models::AuthUser;
use crate::routes::AppState;
use crate::services::profile_service;
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use common::api::{
    Allergy, AllergyInput, ChronicDisease, ChronicDiseaseInput, DoctorNote, DoctorNoteInput,
    DoctorNoteUpdate, EmergencyContact, EmergencyContactInput, FullProfile, MedicalProfile,
    Medication, MedicationInput, ProfileInput,
};
use std::sync::Arc;
use uuid::Uuid;

/// GET /api/v1/profiles
pub async fn handle_get_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<FullProfile>, ApiError> {
    let profile = profile_service::get_full_profile(&state.pool, &auth.user).await?;
    Ok(Json(profile))
}

/// POST /api/v1/profiles
pub async fn handle_create_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<ProfileInput>,
) -> Result<(StatusCode, Json<MedicalProfile>), ApiError> {
    let profile = profile_service::create_profile(&state.pool, auth.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// PUT /api/v1/profiles
pub async fn handle_update_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<ProfileInput>,
) -> Result<Json<MedicalProfile>, ApiError> {
    let profile = profile_service::update_profile(&state.pool, auth.user_id(), &payload).await?;
    Ok(Json(profile))
}

// ============================================================================
// allergies
// ============================================================================

pub async fn handle_list_allergies(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Allergy>>, ApiError> {
    let items = profile_service::list_allergies(&state.pool, auth.user_id()).await?;
    Ok(Json(items))
}

pub async fn handle_create_allergy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<AllergyInput>,
) -> Result<(StatusCode, Json<Allergy>), ApiError> {
    let item = profile_service::create_allergy(&state.pool, auth.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn handle_get_allergy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(allergy_id): ApiPath<Uuid>,
) -> Result<Json<Allergy>, ApiError> {
    let item = profile_service::get_allergy(&state.pool, auth.user_id(), allergy_id).await?;
    Ok(Json(item))
}

pub async fn handle_update_allergy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(allergy_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AllergyInput>,
) -> Result<Json<Allergy>, ApiError> {
    let item =
        profile_service::update_allergy(&state.pool, auth.user_id(), allergy_id, &payload).await?;
    Ok(Json(item))
}

pub async fn handle_delete_allergy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(allergy_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    profile_service::delete_allergy(&state.pool, auth.user_id(), allergy_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// chronic-diseases
// ============================================================================

pub async fn handle_list_diseases(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ChronicDisease>>, ApiError> {
    let items = profile_service::list_diseases(&state.pool, auth.user_id()).await?;
    Ok(Json(items))
}

pub async fn handle_create_disease(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<ChronicDiseaseInput>,
) -> Result<(StatusCode, Json<ChronicDisease>), ApiError> {
    let item = profile_service::create_disease(&state.pool, auth.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn handle_get_disease(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(disease_id): ApiPath<Uuid>,
) -> Result<Json<ChronicDisease>, ApiError> {
    let item = profile_service::get_disease(&state.pool, auth.user_id(), disease_id).await?;
    Ok(Json(item))
}

pub async fn handle_update_disease(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(disease_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ChronicDiseaseInput>,
) -> Result<Json<ChronicDisease>, ApiError> {
    let item =
        profile_service::update_disease(&state.pool, auth.user_id(), disease_id, &payload).await?;
    Ok(Json(item))
}

pub async fn handle_delete_disease(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(disease_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    profile_service::delete_disease(&state.pool, auth.user_id(), disease_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// medications
// ============================================================================

pub async fn handle_list_medications(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Medication>>, ApiError> {
    let items = profile_service::list_medications(&state.pool, auth.user_id()).await?;
    Ok(Json(items))
}

pub async fn handle_create_medication(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<MedicationInput>,
) -> Result<(StatusCode, Json<Medication>), ApiError> {
    let item = profile_service::create_medication(&state.pool, auth.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn handle_get_medication(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(medication_id): ApiPath<Uuid>,
) -> Result<Json<Medication>, ApiError> {
    let item = profile_service::get_medication(&state.pool, auth.user_id(), medication_id).await?;
    Ok(Json(item))
}

pub async fn handle_update_medication(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(medication_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<MedicationInput>,
) -> Result<Json<Medication>, ApiError> {
    let item =
        profile_service::update_medication(&state.pool, auth.user_id(), medication_id, &payload).await?;
    Ok(Json(item))
}

pub async fn handle_delete_medication(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(medication_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    profile_service::delete_medication(&state.pool, auth.user_id(), medication_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// emergency-contacts
// ============================================================================

pub async fn handle_list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<EmergencyContact>>, ApiError> {
    let items = profile_service::list_contacts(&state.pool, auth.user_id()).await?;
    Ok(Json(items))
}

pub async fn handle_create_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<EmergencyContactInput>,
) -> Result<(StatusCode, Json<EmergencyContact>), ApiError> {
    let item = profile_service::create_contact(&state.pool, auth.user_id(), &payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn handle_get_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(contact_id): ApiPath<Uuid>,
) -> Result<Json<EmergencyContact>, ApiError> {
    let item = profile_service::get_contact(&state.pool, auth.user_id(), contact_id).await?;
    Ok(Json(item))
}

pub async fn handle_update_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(contact_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<EmergencyContactInput>,
) -> Result<Json<EmergencyContact>, ApiError> {
    let item =
        profile_service::update_contact(&state.pool, auth.user_id(), contact_id, &payload).await?;
    Ok(Json(item))
}

pub async fn handle_delete_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(contact_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    profile_service::delete_contact(&state.pool, auth.user_id(), contact_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// doctor-notes
// ============================================================================

/// GET /api/v1/profiles/doctor-notes
///
/// Medical workers get the notes they wrote, patients the notes on their
/// own profile.
pub async fn handle_list_notes(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<DoctorNote>>, ApiError> {
    let notes = profile_service::list_notes(&state.pool, &auth.user).await?;
    Ok(Json(notes))
}

/// POST /api/v1/profiles/doctor-notes (medical workers only)
pub async fn handle_create_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<DoctorNoteInput>,
) -> Result<(StatusCode, Json<DoctorNote>), ApiError> {
    let note = profile_service::create_note(&state.pool, &auth.user, &payload).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn handle_get_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(note_id): ApiPath<Uuid>,
) -> Result<Json<DoctorNote>, ApiError> {
    let note = profile_service::get_note(&state.pool, &auth.user, note_id).await?;
    Ok(Json(note))
}

pub async fn handle_update_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(note_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<DoctorNoteUpdate>,
) -> Result<Json<DoctorNote>, ApiError> {
    let note = profile_service::update_note(&state.pool, &auth.user, note_id, &payload).await?;
    Ok(Json(note))
}

pub async fn handle_delete_note(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(note_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    profile_service::delete_note(&state.pool, &auth.user, note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
