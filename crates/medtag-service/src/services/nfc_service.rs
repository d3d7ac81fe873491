//! NFC tag lifecycle and the public emergency read path.
//!
//! A scan discloses medical data to whoever holds the tag, so every attempt
//! is written to `nfc_access_logs`, failures are rate limited per client IP,
//! and successful reads leave an `emergency_accesses` snapshot.

use crate::config::Config;
use crate::crypto;
use crate::errors::ApiError;
use crate::models::{ClientMeta, User};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::{
    record_emergency_access, record_nfc_scan, record_rate_limit_decision,
};
use crate::repositories::audit_logs::NewAuditLog;
use crate::repositories::emergency_accesses::{self, NewEmergencyAccess};
use crate::repositories::nfc_access_logs::{self, NewAccessLog};
use crate::repositories::security_events::NewSecurityEvent;
use crate::repositories::{nfc_tags, profiles};
use crate::services::{audit_service, profile_service};
use chrono::{Duration, Utc};
use common::api::{
    EmergencyAccess, NfcAccessLog, NfcData, NfcTag, Page, RegisterTagRequest,
    RegisterTagResponse, RevokeTagRequest, RevokeTagResponse, ScanRequest, ScanResponse,
};
use common::secret::ExposeSecret;
use common::types::{
    AccessStatus, AccessType, AuditAction, AuditSeverity, ResourceType, SecurityEventType,
    SecuritySeverity, TagStatus,
};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

pub const DEFAULT_TAG_TYPE: &str = "NTAG215";
const MAX_TAG_UID_LENGTH: usize = 100;
const MAX_TAG_TYPE_LENGTH: usize = 50;

// Failed scans from one IP inside the window before further scans are refused
const SCAN_RATE_LIMIT_MAX_FAILED: i64 = 20;
const SCAN_RATE_LIMIT_WINDOW_MINUTES: i64 = 10;

const TAG_NOT_FOUND: &str = "NFC tag not found";
const INVALID_TAG_DATA: &str = "Invalid tag data";

/// Request context of one emergency read.
struct ScanContext<'a> {
    meta: &'a ClientMeta,
    accessed_by: Option<Uuid>,
    device_info: Option<&'a str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl ScanContext<'_> {
    fn access_log<'b>(
        &'b self,
        tag_id: Option<Uuid>,
        status: AccessStatus,
        error_message: Option<&'b str>,
    ) -> NewAccessLog<'b> {
        NewAccessLog {
            tag_id,
            accessed_by: self.accessed_by,
            access_type: AccessType::Scan,
            status,
            ip_address: self.meta.ip_address.as_deref(),
            user_agent: self.meta.user_agent.as_deref(),
            device_info: self.device_info,
            latitude: self.latitude,
            longitude: self.longitude,
            error_message,
        }
    }

    /// Log a refused scan and hand back the error for the caller.
    async fn refuse(
        &self,
        pool: &PgPool,
        tag_id: Option<Uuid>,
        status: AccessStatus,
        error: ApiError,
    ) -> ApiError {
        let message = error.to_string();
        audit_service::record_access_log(pool, &self.access_log(tag_id, status, Some(&message)))
            .await;
        record_nfc_scan(status.as_str());
        tracing::debug!(target: "medtag.nfc", tag_id = ?tag_id, status = %status, error = %message, "Scan refused");
        error
    }
}

pub fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ApiError> {
    if latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(ApiError::BadRequest(
            "Latitude must be between -90 and 90".to_string(),
        ));
    }
    if longitude.is_some_and(|lon| !(-180.0..=180.0).contains(&lon)) {
        return Err(ApiError::BadRequest(
            "Longitude must be between -180 and 180".to_string(),
        ));
    }
    Ok(())
}

/// Refuse clients with too many recent failed scans.
async fn check_scan_rate_limit(pool: &PgPool, meta: &ClientMeta) -> Result<(), ApiError> {
    let Some(ip_address) = meta.ip_address.as_deref() else {
        return Ok(());
    };

    let since = Utc::now() - Duration::minutes(SCAN_RATE_LIMIT_WINDOW_MINUTES);
    let failed = nfc_access_logs::count_failed_scans_from_ip(pool, ip_address, since).await?;

    if failed >= SCAN_RATE_LIMIT_MAX_FAILED {
        record_rate_limit_decision("scan", "rejected");
        tracing::warn!(
            target: "medtag.nfc",
            failed_scans = failed,
            "Scan rejected: too many failed scans from client"
        );

        let mut event = NewSecurityEvent::new(
            SecurityEventType::RateLimitExceeded,
            SecuritySeverity::Warning,
            format!(
                "{} failed tag scans within {} minutes",
                failed, SCAN_RATE_LIMIT_WINDOW_MINUTES
            ),
        )
        .with_meta(meta);
        event.endpoint = Some("/api/v1/nfc/scan".to_string());
        event.action_taken = "Scan refused".to_string();
        audit_service::record_security_event(pool, event).await;

        return Err(ApiError::TooManyRequests {
            retry_after_seconds: SCAN_RATE_LIMIT_WINDOW_MINUTES * 60,
            message: "Too many failed scan attempts. Please try again later.".to_string(),
        });
    }

    record_rate_limit_decision("scan", "allowed");
    Ok(())
}

// ============================================================================
// Tag management
// ============================================================================

#[instrument(skip_all)]
pub async fn register_tag(
    pool: &PgPool,
    config: &Config,
    user: &User,
    request: &RegisterTagRequest,
    meta: &ClientMeta,
) -> Result<RegisterTagResponse, ApiError> {
    let tag_uid = request.tag_uid.trim();
    if tag_uid.is_empty() || tag_uid.len() > MAX_TAG_UID_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Tag UID must be 1 to {} characters",
            MAX_TAG_UID_LENGTH
        )));
    }
    let tag_type = request
        .tag_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TAG_TYPE);
    if tag_type.len() > MAX_TAG_TYPE_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Tag type must be at most {} characters",
            MAX_TAG_TYPE_LENGTH
        )));
    }

    if profiles::get_by_user(pool, user.user_id).await?.is_none() {
        return Err(ApiError::BadRequest(
            "Create a medical profile before registering a tag".to_string(),
        ));
    }

    let public_key_id = Uuid::new_v4();
    let checksum = crypto::tag_checksum(config.tag_key.expose_secret(), tag_uid, &public_key_id)?;

    let tag = nfc_tags::create(pool, user.user_id, tag_uid, tag_type, public_key_id, &checksum).await?;

    tracing::info!(
        target: "medtag.nfc",
        user_id = %user.user_id,
        tag_id = %tag.tag_id,
        tag_uid_hash = %hash_for_correlation(tag_uid),
        "NFC tag registered"
    );

    audit_service::record_access_log(
        pool,
        &NewAccessLog {
            tag_id: Some(tag.tag_id),
            accessed_by: Some(user.user_id),
            access_type: AccessType::Register,
            status: AccessStatus::Success,
            ip_address: meta.ip_address.as_deref(),
            user_agent: meta.user_agent.as_deref(),
            device_info: None,
            latitude: None,
            longitude: None,
            error_message: None,
        },
    )
    .await;

    let mut log = NewAuditLog::new(
        AuditAction::NfcRegister,
        ResourceType::NfcTag,
        "NFC tag registered".to_string(),
    )
    .with_user(user.user_id)
    .with_meta(meta);
    log.resource_id = Some(tag.tag_id.to_string());
    audit_service::record(pool, log).await;

    Ok(RegisterTagResponse {
        nfc_data: NfcData {
            tag_id: tag.tag_id,
            public_key_id,
            checksum,
        },
        tag,
    })
}

/// The caller's tags, newest first.
pub async fn list_tags(pool: &PgPool, user_id: Uuid) -> Result<Vec<NfcTag>, ApiError> {
    nfc_tags::list_by_user(pool, user_id).await
}

#[instrument(skip_all)]
pub async fn revoke_tag(
    pool: &PgPool,
    user: &User,
    request: &RevokeTagRequest,
    meta: &ClientMeta,
) -> Result<RevokeTagResponse, ApiError> {
    let tag = nfc_tags::get_by_id(pool, request.tag_id)
        .await?
        .filter(|tag| tag.user_id == user.user_id)
        .ok_or_else(|| ApiError::NotFound(TAG_NOT_FOUND.to_string()))?;

    let not_active = || ApiError::BadRequest("Only active tags can be revoked".to_string());
    if tag.status != TagStatus::Active {
        return Err(not_active());
    }

    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    let tag = nfc_tags::revoke(pool, tag.tag_id, reason)
        .await?
        .ok_or_else(not_active)?;

    tracing::info!(target: "medtag.nfc", user_id = %user.user_id, tag_id = %tag.tag_id, "NFC tag revoked");

    audit_service::record_access_log(
        pool,
        &NewAccessLog {
            tag_id: Some(tag.tag_id),
            accessed_by: Some(user.user_id),
            access_type: AccessType::Revoke,
            status: AccessStatus::Success,
            ip_address: meta.ip_address.as_deref(),
            user_agent: meta.user_agent.as_deref(),
            device_info: None,
            latitude: None,
            longitude: None,
            error_message: reason,
        },
    )
    .await;

    let mut log = NewAuditLog::new(
        AuditAction::NfcRevoke,
        ResourceType::NfcTag,
        "NFC tag revoked".to_string(),
    )
    .with_user(user.user_id)
    .with_meta(meta);
    log.resource_id = Some(tag.tag_id.to_string());
    log.severity = AuditSeverity::Medium;
    audit_service::record(pool, log).await;

    Ok(RevokeTagResponse {
        message: "NFC tag revoked".to_string(),
        tag,
    })
}

// ============================================================================
// Emergency reads
// ============================================================================

/// Scan of a physical tag. Public: `accessed_by` is set only when the reader
/// happened to present a valid access token.
#[instrument(skip_all)]
pub async fn scan(
    pool: &PgPool,
    config: &Config,
    request: &ScanRequest,
    meta: &ClientMeta,
    accessed_by: Option<Uuid>,
) -> Result<ScanResponse, ApiError> {
    check_scan_rate_limit(pool, meta).await?;

    let ctx = ScanContext {
        meta,
        accessed_by,
        device_info: request.device_info.as_deref(),
        latitude: request.latitude,
        longitude: request.longitude,
    };

    if let Err(error) = validate_coordinates(request.latitude, request.longitude) {
        return Err(ctx.refuse(pool, None, AccessStatus::Failed, error).await);
    }

    let tag_uid = request.tag_uid.trim();
    tracing::debug!(target: "medtag.nfc", tag_uid_hash = %hash_for_correlation(tag_uid), "Tag scanned");

    let Some(tag) = nfc_tags::get_by_uid(pool, tag_uid).await? else {
        return Err(ctx
            .refuse(pool, None, AccessStatus::Failed, ApiError::NotFound(TAG_NOT_FOUND.to_string()))
            .await);
    };

    if tag.status != TagStatus::Active {
        let error = ApiError::TagInactive(format!("NFC tag is {}", tag.status.as_str().to_lowercase()));
        return Err(ctx.refuse(pool, Some(tag.tag_id), AccessStatus::Failed, error).await);
    }

    if tag.public_key_id != request.public_key_id {
        let error = ApiError::BadRequest(format!("{}: public key mismatch", INVALID_TAG_DATA));
        return Err(ctx.refuse(pool, Some(tag.tag_id), AccessStatus::Failed, error).await);
    }

    let checksum_ok = crypto::verify_tag_checksum(
        config.tag_key.expose_secret(),
        &tag.tag_uid,
        &tag.public_key_id,
        request.checksum.trim(),
    )?;
    if !checksum_ok {
        let error = ApiError::BadRequest(format!("{}: checksum mismatch", INVALID_TAG_DATA));
        return Err(ctx.refuse(pool, Some(tag.tag_id), AccessStatus::Failed, error).await);
    }

    serve_emergency_data(pool, &tag, &ctx, "nfc").await
}

/// A scan whose body could not be parsed. Subject to the same rate limit
/// and logged as `SCAN/FAILED` with the parse error.
pub async fn reject_malformed_scan(
    pool: &PgPool,
    meta: &ClientMeta,
    accessed_by: Option<Uuid>,
    error: ApiError,
) -> ApiError {
    if let Err(limited) = check_scan_rate_limit(pool, meta).await {
        return limited;
    }

    let ctx = ScanContext {
        meta,
        accessed_by,
        device_info: None,
        latitude: None,
        longitude: None,
    };
    ctx.refuse(pool, None, AccessStatus::Failed, error).await
}

/// QR code path: the printed code carries only the tag id, so there is no
/// checksum to verify. Unknown and inactive tags are both 404.
#[instrument(skip_all)]
pub async fn emergency_by_tag_id(
    pool: &PgPool,
    tag_id: Uuid,
    meta: &ClientMeta,
    accessed_by: Option<Uuid>,
) -> Result<ScanResponse, ApiError> {
    check_scan_rate_limit(pool, meta).await?;

    let ctx = ScanContext {
        meta,
        accessed_by,
        device_info: None,
        latitude: None,
        longitude: None,
    };

    let tag = match nfc_tags::get_by_id(pool, tag_id).await? {
        Some(tag) if tag.status == TagStatus::Active => tag,
        other => {
            let error = ApiError::NotFound(TAG_NOT_FOUND.to_string());
            return Err(ctx
                .refuse(pool, other.map(|t| t.tag_id), AccessStatus::Failed, error)
                .await);
        }
    };

    serve_emergency_data(pool, &tag, &ctx, "qr").await
}

async fn serve_emergency_data(
    pool: &PgPool,
    tag: &NfcTag,
    ctx: &ScanContext<'_>,
    channel: &str,
) -> Result<ScanResponse, ApiError> {
    nfc_tags::record_scan(pool, tag.tag_id).await?;

    let Some(profile) = profiles::get_by_user(pool, tag.user_id).await? else {
        let error = ApiError::NotFound("Medical profile not found".to_string());
        return Err(ctx.refuse(pool, Some(tag.tag_id), AccessStatus::Failed, error).await);
    };

    if !profile.is_public {
        let error = ApiError::Forbidden("This medical profile is private".to_string());
        return Err(ctx.refuse(pool, Some(tag.tag_id), AccessStatus::Denied, error).await);
    }

    let emergency = profile_service::emergency_profile(pool, &profile).await?;

    audit_service::record_access_log(pool, &ctx.access_log(Some(tag.tag_id), AccessStatus::Success, None))
        .await;
    record_nfc_scan(AccessStatus::Success.as_str());
    record_emergency_access(channel);

    let snapshot = serde_json::to_value(&emergency).unwrap_or_default();
    let access = emergency_accesses::insert(
        pool,
        &NewEmergencyAccess {
            tag_id: tag.tag_id,
            accessed_by: ctx.accessed_by,
            ip_address: ctx.meta.ip_address.as_deref(),
            user_agent: ctx.meta.user_agent.as_deref(),
            device_info: ctx.device_info,
            latitude: ctx.latitude,
            longitude: ctx.longitude,
            data_accessed: snapshot,
        },
    )
    .await;
    if let Err(e) = access {
        tracing::warn!(target: "medtag.nfc", error = %e, "Failed to record emergency access");
        crate::observability::metrics::record_audit_log_failure("emergency_access");
    }

    let mut log = NewAuditLog::new(
        AuditAction::EmergencyAccess,
        ResourceType::Profile,
        format!("Emergency data read via {}", channel),
    )
    .with_meta(ctx.meta);
    log.user_id = ctx.accessed_by;
    log.resource_id = Some(profile.profile_id.to_string());
    log.severity = AuditSeverity::High;
    audit_service::record(pool, log).await;

    tracing::info!(
        target: "medtag.nfc",
        tag_id = %tag.tag_id,
        channel = channel,
        "Emergency data served"
    );

    Ok(ScanResponse {
        profile: emergency,
        message: "Emergency medical data retrieved".to_string(),
    })
}

// ============================================================================
// Logs
// ============================================================================

/// Admins see every log; everyone else sees logs of their own tags.
pub async fn list_access_logs(
    pool: &PgPool,
    user: &User,
    page: Page,
) -> Result<Vec<NfcAccessLog>, ApiError> {
    let (limit, offset) = audit_service::clamp_page(page.limit, page.offset);
    let owner = (!user.role.is_admin()).then_some(user.user_id);
    nfc_access_logs::list(pool, owner, limit, offset).await
}

pub async fn list_emergency_accesses(
    pool: &PgPool,
    user: &User,
    page: Page,
) -> Result<Vec<EmergencyAccess>, ApiError> {
    let (limit, offset) = audit_service::clamp_page(page.limit, page.offset);
    let owner = (!user.role.is_admin()).then_some(user.user_id);
    emergency_accesses::list(pool, owner, limit, offset).await
}
