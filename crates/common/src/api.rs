//! Request and response bodies of the MedTag REST API.
//!
//! Row-shaped types derive `sqlx::FromRow` when the `sqlx` feature is on so the
//! service can read them straight out of PostgreSQL. Types that carry
//! passwords, tokens, OTP codes or tag checksums implement `Debug` by hand and
//! redact those fields.

use crate::types::{
    AccessStatus, AccessType, AllergySeverity, AuditAction, AuditSeverity, BloodType,
    MedicationFrequency, Relationship, ResourceType, Role, SecurityEventType, SecuritySeverity,
    TagStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const REDACTED: &str = "[REDACTED]";

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    1
}

// ============================================================================
// Authentication
// ============================================================================

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    /// "Last First Middle", middle omitted when absent
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub two_factor_enabled: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &REDACTED)
            .field("password", &REDACTED)
            .field("password_confirm", &REDACTED)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("middle_name", &self.middle_name)
            .field("phone", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &REDACTED)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Access/refresh token pair issued on login, registration and 2FA verification.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub user: UserInfo,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &REDACTED)
            .field("refresh", &REDACTED)
            .field("user", &self.user.user_id)
            .finish()
    }
}

/// Returned by login instead of tokens when the account has 2FA enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorChallenge {
    pub requires_2fa: bool,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Authenticated(TokenPair),
    TwoFactorRequired(TwoFactorChallenge),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

impl fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("access", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct LogoutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl fmt::Debug for LogoutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoutRequest")
            .field("refresh", &self.refresh.as_ref().map(|_| REDACTED))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Partial update of the caller's own account. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("old_password", &REDACTED)
            .field("new_password", &REDACTED)
            .field("new_password_confirm", &REDACTED)
            .finish()
    }
}

/// Pending TOTP secret, shown once so it can be added to an authenticator app.
#[derive(Clone, Serialize, Deserialize)]
pub struct TwoFactorSetupResponse {
    /// Base32 (RFC 4648, unpadded) shared secret
    pub secret: String,
    /// `otpauth://totp/...` provisioning URI, suitable for a QR code
    pub otpauth_url: String,
}

impl fmt::Debug for TwoFactorSetupResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoFactorSetupResponse")
            .field("secret", &REDACTED)
            .field("otpauth_url", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OtpRequest {
    pub otp_code: String,
}

impl fmt::Debug for OtpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpRequest")
            .field("otp_code", &REDACTED)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TwoFactorVerifyRequest {
    pub user_id: Uuid,
    pub otp_code: String,
}

impl fmt::Debug for TwoFactorVerifyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoFactorVerifyRequest")
            .field("user_id", &self.user_id)
            .field("otp_code", &REDACTED)
            .finish()
    }
}

// ============================================================================
// Medical profile
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MedicalProfile {
    pub profile_id: Uuid,
    pub user_id: Uuid,
    pub blood_type: Option<BloodType>,
    /// Centimetres
    pub height: Option<i32>,
    /// Kilograms
    pub weight: Option<f64>,
    pub emergency_notes: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create or partially update a profile. On create, absent fields take their
/// defaults (`is_public` defaults to true).
///
/// The nullable fields are three-state: absent (`None`) leaves the stored
/// value alone, `null` (`Some(None)`) clears it, and a value (`Some(Some(v))`)
/// replaces it. A cleared `emergency_notes` becomes the empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileInput {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<Option<BloodType>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub height: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub weight: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub emergency_notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

/// Keeps an explicit `null` apart from an absent field. Only reached when the
/// key is present, so `null` lands as `Some(None)`; pair with
/// `#[serde(default)]` for the absent case.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Profile together with every sub-resource, as shown to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullProfile {
    #[serde(flatten)]
    pub profile: MedicalProfile,
    pub user_name: String,
    pub allergies: Vec<Allergy>,
    pub chronic_diseases: Vec<ChronicDisease>,
    pub medications: Vec<Medication>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub doctor_notes: Vec<DoctorNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Allergy {
    pub allergy_id: Uuid,
    pub profile_id: Uuid,
    pub allergen: String,
    pub severity: AllergySeverity,
    pub reaction: String,
    pub notes: String,
    pub diagnosed_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllergyInput {
    pub allergen: String,
    #[serde(default)]
    pub severity: AllergySeverity,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ChronicDisease {
    pub disease_id: Uuid,
    pub profile_id: Uuid,
    pub disease_name: String,
    pub icd_code: String,
    pub diagnosis_date: Option<NaiveDate>,
    pub notes: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronicDiseaseInput {
    pub disease_name: String,
    #[serde(default)]
    pub icd_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Medication {
    pub medication_id: Uuid,
    pub profile_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: MedicationFrequency,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub prescribing_doctor: String,
    pub notes: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationInput {
    pub medication_name: String,
    pub dosage: String,
    pub frequency: MedicationFrequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub prescribing_doctor: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct EmergencyContact {
    pub contact_id: Uuid,
    pub profile_id: Uuid,
    pub full_name: String,
    pub relationship: Relationship,
    pub phone: String,
    pub email: Option<String>,
    /// 1 is contacted first
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyContactInput {
    pub full_name: String,
    pub relationship: Relationship,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DoctorNote {
    pub note_id: Uuid,
    pub profile_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub doctor_name: Option<String>,
    pub note: String,
    pub is_emergency_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Written by a medical worker against a patient's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorNoteInput {
    pub profile_id: Uuid,
    pub note: String,
    #[serde(default)]
    pub is_emergency_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorNoteUpdate {
    pub note: String,
    #[serde(default)]
    pub is_emergency_visible: bool,
}

/// Read-only subset of a profile served to first responders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyProfile {
    #[serde(rename = "id")]
    pub profile_id: Uuid,
    pub user_name: String,
    pub blood_type: Option<BloodType>,
    pub height: Option<i32>,
    pub weight: Option<f64>,
    pub emergency_notes: String,
    pub allergies: Vec<Allergy>,
    /// Active diseases only
    pub chronic_diseases: Vec<ChronicDisease>,
    /// Active medications only
    pub medications: Vec<Medication>,
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Doctor notes marked emergency-visible
    pub emergency_notes_visible: Vec<DoctorNote>,
}

// ============================================================================
// NFC tags
// ============================================================================

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct NfcTag {
    pub tag_id: Uuid,
    pub user_id: Uuid,
    pub tag_uid: String,
    pub tag_type: String,
    pub public_key_id: Uuid,
    pub checksum: String,
    pub status: TagStatus,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub scan_count: i64,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for NfcTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NfcTag")
            .field("tag_id", &self.tag_id)
            .field("user_id", &self.user_id)
            .field("tag_type", &self.tag_type)
            .field("status", &self.status)
            .field("scan_count", &self.scan_count)
            .field("tag_uid", &REDACTED)
            .field("checksum", &REDACTED)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTagRequest {
    pub tag_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_type: Option<String>,
}

/// Payload written onto the physical tag after registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfcData {
    pub tag_id: Uuid,
    pub public_key_id: Uuid,
    pub checksum: String,
}

impl fmt::Debug for NfcData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NfcData")
            .field("tag_id", &self.tag_id)
            .field("public_key_id", &self.public_key_id)
            .field("checksum", &REDACTED)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTagResponse {
    pub tag: NfcTag,
    pub nfc_data: NfcData,
}

/// Body posted by a reader that has scanned a tag.
#[derive(Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub tag_uid: String,
    pub public_key_id: Uuid,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("tag_uid", &REDACTED)
            .field("public_key_id", &self.public_key_id)
            .field("checksum", &REDACTED)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("device_info", &self.device_info)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub profile: EmergencyProfile,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeTagRequest {
    pub tag_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeTagResponse {
    pub message: String,
    pub tag: NfcTag,
}

/// One tag registration, revocation or scan attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct NfcAccessLog {
    pub log_id: Uuid,
    pub tag_id: Option<Uuid>,
    pub accessed_by: Option<Uuid>,
    pub access_type: AccessType,
    pub status: AccessStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub error_message: Option<String>,
    pub accessed_at: DateTime<Utc>,
}

/// A successful emergency read, with a snapshot of what was served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct EmergencyAccess {
    pub access_id: Uuid,
    pub tag_id: Uuid,
    pub accessed_by: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub data_accessed: serde_json::Value,
    pub accessed_at: DateTime<Utc>,
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditLog {
    pub log_id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SecurityEvent {
    pub event_id: Uuid,
    pub event_type: SecurityEventType,
    pub severity: SecuritySeverity,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub description: String,
    pub additional_data: Option<serde_json::Value>,
    pub action_taken: String,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Paging for list endpoints. The service clamps `limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AuditAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AuditSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<SecurityEventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SecuritySeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}
