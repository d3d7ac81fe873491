//! Account lifecycle: registration, login (with lockout and 2FA), logout,
//! profile details and password changes.

use crate::config::Config;
use crate::crypto::{self, totp, DUMMY_PASSWORD_HASH};
use crate::errors::ApiError;
use crate::models::{ClientMeta, User};
use crate::observability::metrics::{record_rate_limit_decision, record_token_issuance};
use crate::repositories::audit_logs::NewAuditLog;
use crate::repositories::security_events::NewSecurityEvent;
use crate::repositories::users::NewUser;
use crate::repositories::{login_attempts, refresh_tokens, totp_devices, users};
use crate::services::{audit_service, token_service, two_factor_service};
use chrono::{Duration, Utc};
use common::api::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    RegisterRequest, TokenPair, TwoFactorChallenge, TwoFactorVerifyRequest, UpdateUserRequest,
    UserInfo,
};
use common::secret::ExposeSecret;
use common::types::{AuditAction, AuditSeverity, ResourceType, Role, SecurityEventType, SecuritySeverity};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;

const MIN_PASSWORD_LENGTH: usize = 8;

// Lockout: this many failures for one email inside the window
const LOCKOUT_MAX_FAILED_ATTEMPTS: i64 = 5;
const LOCKOUT_WINDOW_MINUTES: i64 = 15;

const INVALID_OTP_MESSAGE: &str = "Invalid verification code";

/// Trim and lowercase the domain part. The local part is left as typed.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    if local.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }

    // Domain must have at least one dot and no empty parts
    let domain_parts: Vec<&str> = domain.split('.').collect();
    domain_parts.len() >= 2 && domain_parts.iter().all(|p| !p.is_empty())
}

/// At least eight characters, not all digits, and equal to its confirmation.
pub fn validate_password(password: &str, confirmation: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::BadRequest(
            "Password cannot be entirely numeric".to_string(),
        ));
    }
    if password != confirmation {
        return Err(ApiError::BadRequest("Passwords do not match".to_string()));
    }
    Ok(())
}

fn required_field<'a>(value: &'a str, name: &str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", name)));
    }
    Ok(value)
}

fn optional_field(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Create a PATIENT account and log it straight in.
#[instrument(skip_all)]
pub async fn register(
    pool: &PgPool,
    config: &Config,
    request: &RegisterRequest,
    meta: &ClientMeta,
) -> Result<TokenPair, ApiError> {
    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email format".to_string()));
    }
    validate_password(&request.password, &request.password_confirm)?;
    let first_name = required_field(&request.first_name, "First name")?;
    let last_name = required_field(&request.last_name, "Last name")?;

    let password_hash = crypto::hash_password(&request.password, config.bcrypt_cost)?;

    let user = users::create_user(
        pool,
        &NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name,
            last_name,
            middle_name: optional_field(request.middle_name.as_deref()),
            phone: optional_field(request.phone.as_deref()),
            role: Role::Patient,
        },
    )
    .await?;

    tracing::info!(target: "medtag.user", user_id = %user.user_id, "User registered");

    audit_service::record(
        pool,
        NewAuditLog::new(
            AuditAction::Register,
            ResourceType::User,
            "User registered".to_string(),
        )
        .with_user(user.user_id)
        .with_meta(meta),
    )
    .await;

    token_service::issue_token_pair(pool, config, &user, meta, "register").await
}

/// Reject the attempt when `email` has too many recent failures.
async fn check_lockout(pool: &PgPool, email: &str, meta: &ClientMeta) -> Result<(), ApiError> {
    let since = Utc::now() - Duration::minutes(LOCKOUT_WINDOW_MINUTES);
    let failed = login_attempts::count_failed_since(pool, email, since).await?;

    if failed >= LOCKOUT_MAX_FAILED_ATTEMPTS {
        record_rate_limit_decision("login", "rejected");
        tracing::warn!(
            target: "medtag.user",
            failed_attempts = failed,
            "Login rejected: too many failed attempts"
        );

        let mut event = NewSecurityEvent::new(
            SecurityEventType::BruteForceAttempt,
            SecuritySeverity::Danger,
            format!("{} failed login attempts within {} minutes", failed, LOCKOUT_WINDOW_MINUTES),
        )
        .with_meta(meta);
        event.action_taken = "Login temporarily blocked".to_string();
        audit_service::record_security_event(pool, event).await;

        return Err(ApiError::TooManyRequests {
            retry_after_seconds: LOCKOUT_WINDOW_MINUTES * 60,
            message: "Too many failed login attempts. Please try again later.".to_string(),
        });
    }

    record_rate_limit_decision("login", "allowed");
    Ok(())
}

async fn record_failed_login(
    pool: &PgPool,
    email: &str,
    user: Option<&User>,
    reason: &str,
    meta: &ClientMeta,
) {
    if let Err(e) = login_attempts::record(pool, email, false, meta.ip_address.as_deref()).await {
        tracing::warn!(target: "medtag.user", error = %e, "Failed to record login attempt");
    }

    let mut event = NewSecurityEvent::new(
        SecurityEventType::FailedLogin,
        SecuritySeverity::Warning,
        reason.to_string(),
    )
    .with_meta(meta);
    event.user_id = user.map(|u| u.user_id);
    audit_service::record_security_event(pool, event).await;
}

async fn complete_login(
    pool: &PgPool,
    config: &Config,
    user: &User,
    meta: &ClientMeta,
    kind: &str,
) -> Result<TokenPair, ApiError> {
    if let Err(e) = login_attempts::record(pool, &user.email, true, meta.ip_address.as_deref()).await
    {
        tracing::warn!(target: "medtag.user", error = %e, "Failed to record login attempt");
    }
    let user = users::update_last_login(pool, user.user_id).await?;

    audit_service::record(
        pool,
        NewAuditLog::new(AuditAction::Login, ResourceType::User, "User logged in".to_string())
            .with_user(user.user_id)
            .with_meta(meta),
    )
    .await;

    tracing::info!(target: "medtag.user", user_id = %user.user_id, "User logged in");

    token_service::issue_token_pair(pool, config, &user, meta, kind).await
}

/// Password login. Returns a 2FA challenge instead of tokens when the
/// account has two-factor authentication enabled.
#[instrument(skip_all)]
pub async fn login(
    pool: &PgPool,
    config: &Config,
    request: &LoginRequest,
    meta: &ClientMeta,
) -> Result<LoginResponse, ApiError> {
    let start = Instant::now();
    let email = normalize_email(&request.email);

    check_lockout(pool, &email, meta).await?;

    let user = users::get_by_email(pool, &email).await?;

    // Always run bcrypt so unknown emails cost the same as wrong passwords
    let hash_to_verify = user
        .as_ref()
        .map_or(DUMMY_PASSWORD_HASH, |u| u.password_hash.as_str());
    let is_valid = crypto::verify_password(&request.password, hash_to_verify)?;

    let user = match user {
        Some(user) if is_valid => user,
        other => {
            record_failed_login(pool, &email, other.as_ref(), "Invalid email or password", meta)
                .await;
            record_token_issuance("login", "error", start.elapsed());
            return Err(ApiError::InvalidCredentials);
        }
    };

    if !user.is_active {
        record_failed_login(pool, &email, Some(&user), "Login to disabled account", meta).await;
        record_token_issuance("login", "error", start.elapsed());
        return Err(ApiError::Forbidden("This account has been disabled".to_string()));
    }

    if user.two_factor_enabled {
        tracing::debug!(target: "medtag.user", user_id = %user.user_id, "Two-factor challenge issued");
        return Ok(LoginResponse::TwoFactorRequired(TwoFactorChallenge {
            requires_2fa: true,
            user_id: user.user_id,
        }));
    }

    let pair = complete_login(pool, config, &user, meta, "login").await?;
    Ok(LoginResponse::Authenticated(pair))
}

/// Second step of a 2FA login.
///
/// Wrong codes count towards the same lockout as wrong passwords.
#[instrument(skip_all)]
pub async fn verify_two_factor(
    pool: &PgPool,
    config: &Config,
    request: &TwoFactorVerifyRequest,
    meta: &ClientMeta,
) -> Result<TokenPair, ApiError> {
    let invalid = || ApiError::BadRequest(INVALID_OTP_MESSAGE.to_string());

    let user = users::get_by_id(pool, request.user_id)
        .await?
        .filter(|u| u.is_active && u.two_factor_enabled)
        .ok_or_else(invalid)?;

    check_lockout(pool, &user.email, meta).await?;

    let device = totp_devices::get(pool, user.user_id)
        .await?
        .filter(|d| d.confirmed)
        .ok_or_else(invalid)?;

    let secret = two_factor_service::decrypt_secret(device, config.master_key.expose_secret())?;

    if !totp::verify(&secret, &request.otp_code, Utc::now().timestamp())? {
        record_failed_login(pool, &user.email, Some(&user), "Invalid two-factor code", meta).await;
        return Err(invalid());
    }

    complete_login(pool, config, &user, meta, "two_factor").await
}

/// Deactivate the presented refresh token (if it is the caller's) and
/// record the logout. Always succeeds from the caller's point of view.
pub async fn logout(
    pool: &PgPool,
    user: &User,
    request: &LogoutRequest,
    meta: &ClientMeta,
) -> Result<MessageResponse, ApiError> {
    if let Some(refresh) = request.refresh.as_deref().filter(|r| !r.trim().is_empty()) {
        let revoked = token_service::revoke_refresh_token(pool, user.user_id, refresh).await?;
        tracing::debug!(target: "medtag.user", user_id = %user.user_id, revoked, "Logout");
    }

    audit_service::record(
        pool,
        NewAuditLog::new(AuditAction::Logout, ResourceType::User, "User logged out".to_string())
            .with_user(user.user_id)
            .with_meta(meta),
    )
    .await;

    Ok(MessageResponse {
        message: "Successfully logged out".to_string(),
    })
}

pub async fn update_me(
    pool: &PgPool,
    user: &User,
    request: &UpdateUserRequest,
) -> Result<UserInfo, ApiError> {
    // Names may be changed but not blanked
    if request.first_name.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(ApiError::BadRequest("First name is required".to_string()));
    }
    if request.last_name.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(ApiError::BadRequest("Last name is required".to_string()));
    }

    let updated = users::update_details(
        pool,
        user.user_id,
        request.first_name.as_deref().map(str::trim),
        request.last_name.as_deref().map(str::trim),
        request.middle_name.as_deref().map(str::trim),
        request.phone.as_deref().map(str::trim),
    )
    .await?;

    Ok(updated.to_info())
}

/// Change the caller's password and sign out every other session.
#[instrument(skip_all)]
pub async fn change_password(
    pool: &PgPool,
    config: &Config,
    user: &User,
    request: &ChangePasswordRequest,
    meta: &ClientMeta,
) -> Result<MessageResponse, ApiError> {
    if !crypto::verify_password(&request.old_password, &user.password_hash)? {
        return Err(ApiError::BadRequest("Current password is incorrect".to_string()));
    }
    validate_password(&request.new_password, &request.new_password_confirm)?;

    let password_hash = crypto::hash_password(&request.new_password, config.bcrypt_cost)?;
    users::update_password(pool, user.user_id, &password_hash).await?;

    let revoked = refresh_tokens::deactivate_all_for_user(pool, user.user_id).await?;
    tracing::info!(
        target: "medtag.user",
        user_id = %user.user_id,
        revoked_sessions = revoked,
        "Password changed"
    );

    let mut log = NewAuditLog::new(
        AuditAction::PasswordChange,
        ResourceType::User,
        "Password changed".to_string(),
    )
    .with_user(user.user_id)
    .with_meta(meta);
    log.severity = AuditSeverity::Medium;
    audit_service::record(pool, log).await;

    Ok(MessageResponse {
        message: "Password changed successfully".to_string(),
    })
}
