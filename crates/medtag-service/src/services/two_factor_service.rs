//! TOTP enrolment. The shared secret is stored encrypted under the master
//! key and only becomes active once the user proves they can generate codes.

use crate::config::Config;
use crate::crypto::{self, totp, EncryptedKey};
use crate::errors::ApiError;
use crate::models::{ClientMeta, TotpDevice, User};
use crate::repositories::audit_logs::NewAuditLog;
use crate::repositories::{totp_devices, users};
use crate::services::audit_service;
use chrono::Utc;
use common::api::{MessageResponse, TwoFactorSetupResponse};
use common::secret::{ExposeSecret, SecretBox};
use common::types::{AuditAction, AuditSeverity, ResourceType};
use sqlx::PgPool;

pub fn decrypt_secret(device: TotpDevice, master_key: &[u8]) -> Result<Vec<u8>, ApiError> {
    crypto::decrypt_with_master_key(
        &EncryptedKey {
            encrypted_data: SecretBox::new(Box::new(device.secret_encrypted)),
            nonce: device.encryption_nonce,
            tag: device.encryption_tag,
        },
        master_key,
    )
}

/// Return the pending secret for `user`, creating one if needed.
///
/// Calling this again before confirming returns the same secret, so a
/// reloaded setup screen keeps matching the authenticator already scanned.
pub async fn setup(
    pool: &PgPool,
    config: &Config,
    user: &User,
) -> Result<TwoFactorSetupResponse, ApiError> {
    if user.two_factor_enabled {
        return Err(ApiError::BadRequest(
            "Two-factor authentication is already enabled".to_string(),
        ));
    }

    let master_key = config.master_key.expose_secret();

    let secret = match totp_devices::get(pool, user.user_id).await? {
        Some(device) if !device.confirmed => decrypt_secret(device, master_key)?,
        _ => {
            let secret = crypto::generate_random_bytes(totp::TOTP_SECRET_BYTES)?;
            let encrypted = crypto::encrypt_with_master_key(&secret, master_key)?;
            totp_devices::upsert_unconfirmed(
                pool,
                user.user_id,
                encrypted.encrypted_data.expose_secret(),
                &encrypted.nonce,
                &encrypted.tag,
            )
            .await?;
            tracing::debug!(target: "medtag.2fa", user_id = %user.user_id, "Created TOTP device");
            secret
        }
    };

    let secret_base32 = totp::base32_encode(&secret);
    let otpauth_url = totp::otpauth_url(&secret_base32, &user.email);

    Ok(TwoFactorSetupResponse {
        secret: secret_base32,
        otpauth_url,
    })
}

/// Confirm the pending device with a code from the authenticator and turn
/// two-factor login on.
pub async fn confirm(
    pool: &PgPool,
    config: &Config,
    user: &User,
    otp_code: &str,
    meta: &ClientMeta,
) -> Result<MessageResponse, ApiError> {
    let device = totp_devices::get(pool, user.user_id)
        .await?
        .filter(|d| !d.confirmed)
        .ok_or_else(|| ApiError::NotFound("No pending two-factor setup".to_string()))?;

    let secret = decrypt_secret(device, config.master_key.expose_secret())?;
    if !totp::verify(&secret, otp_code, Utc::now().timestamp())? {
        return Err(ApiError::BadRequest("Invalid verification code".to_string()));
    }

    totp_devices::confirm(pool, user.user_id).await?;
    users::set_two_factor_enabled(pool, user.user_id, true).await?;

    tracing::info!(target: "medtag.2fa", user_id = %user.user_id, "Two-factor authentication enabled");

    let mut log = NewAuditLog::new(
        AuditAction::TwoFactorEnable,
        ResourceType::User,
        "Two-factor authentication enabled".to_string(),
    )
    .with_user(user.user_id)
    .with_meta(meta);
    log.severity = AuditSeverity::Medium;
    audit_service::record(pool, log).await;

    Ok(MessageResponse {
        message: "Two-factor authentication enabled".to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::test_support::create_user;
    use common::types::Role;

    fn current_code(secret: &[u8]) -> String {
        totp::code_at(secret, (Utc::now().timestamp() / totp::TOTP_STEP_SECONDS) as u64).unwrap()
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_setup_reuses_pending_secret(pool: PgPool) -> Result<(), ApiError> {
        let config = Config::for_tests();
        let user = create_user(&pool, "anna@example.com", Role::Patient).await?;

        let first = setup(&pool, &config, &user).await?;
        let second = setup(&pool, &config, &user).await?;

        assert_eq!(first.secret, second.secret);
        assert_eq!(first.secret.len(), 32);
        assert!(first.otpauth_url.contains(&first.secret));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_confirm_without_setup_not_found(pool: PgPool) -> Result<(), ApiError> {
        let config = Config::for_tests();
        let user = create_user(&pool, "anna@example.com", Role::Patient).await?;

        let result = confirm(&pool, &config, &user, "123456", &ClientMeta::default()).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_confirm_wrong_code_rejected(pool: PgPool) -> Result<(), ApiError> {
        let config = Config::for_tests();
        let user = create_user(&pool, "anna@example.com", Role::Patient).await?;
        setup(&pool, &config, &user).await?;

        let result = confirm(&pool, &config, &user, "not-a-code", &ClientMeta::default()).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        let reloaded = users::get_by_id(&pool, user.user_id).await?.expect("user");
        assert!(!reloaded.two_factor_enabled);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_confirm_enables_two_factor(pool: PgPool) -> Result<(), ApiError> {
        let config = Config::for_tests();
        let user = create_user(&pool, "anna@example.com", Role::Patient).await?;
        setup(&pool, &config, &user).await?;

        let device = totp_devices::get(&pool, user.user_id).await?.expect("device");
        let secret = decrypt_secret(device, config.master_key.expose_secret())?;

        confirm(&pool, &config, &user, &current_code(&secret), &ClientMeta::default()).await?;

        let reloaded = users::get_by_id(&pool, user.user_id).await?.expect("user");
        assert!(reloaded.two_factor_enabled);

        // A second confirmation has nothing pending
        let again = confirm(&pool, &config, &reloaded, &current_code(&secret), &ClientMeta::default()).await;
        assert!(matches!(again, Err(ApiError::NotFound(_))));

        let setup_again = setup(&pool, &config, &reloaded).await;
        assert!(matches!(setup_again, Err(ApiError::BadRequest(_))));
        Ok(())
    }
}
