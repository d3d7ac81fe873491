use crate::crypto::{self, EncryptedKey};
use crate::errors::ApiError;
use crate::models::SigningKey;
use crate::observability::metrics::record_signing_key_init;
use crate::repositories::signing_keys::{self, NewSigningKey};
use chrono::{Duration, Utc};
use common::secret::{ExposeSecret, SecretBox};
use sqlx::PgPool;

const KEY_VALIDITY_DAYS: i64 = 365; // 1 year

/// Get the next sequence number for a key with given prefix
async fn get_next_key_sequence(pool: &PgPool, prefix: &str) -> Result<u32, ApiError> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM signing_keys
        WHERE key_id LIKE $1
        "#,
    )
    .bind(format!("{}%", prefix))
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to count keys: {}", e)))?;

    u32::try_from(count.0 + 1)
        .map_err(|_| ApiError::Database("Signing key sequence out of range".to_string()))
}

/// Make sure an active signing key exists, generating one on first start.
///
/// Key ids have the form `medtag-{YYYY}-{NN}`.
pub async fn initialize_signing_key(pool: &PgPool, master_key: &[u8]) -> Result<(), ApiError> {
    if signing_keys::get_active_key(pool).await?.is_some() {
        record_signing_key_init("loaded");
        return Ok(());
    }

    let now = Utc::now();
    let key_prefix = format!("medtag-{}-", now.format("%Y"));
    let sequence = get_next_key_sequence(pool, &key_prefix).await?;
    let key_id = format!("{}{:02}", key_prefix, sequence);

    let (public_key_pem, private_key_pkcs8) = crypto::generate_signing_key()?;
    let encrypted = crypto::encrypt_with_master_key(&private_key_pkcs8, master_key)?;

    let valid_from = now;
    let valid_until = now + Duration::days(KEY_VALIDITY_DAYS);

    let result = signing_keys::create_signing_key(
        pool,
        &NewSigningKey {
            key_id: &key_id,
            public_key: &public_key_pem,
            private_key_encrypted: encrypted.encrypted_data.expose_secret(),
            encryption_nonce: &encrypted.nonce,
            encryption_tag: &encrypted.tag,
            master_key_version: 1,
            valid_from,
            valid_until,
        },
    )
    .await;

    match result {
        Ok(_) => {
            record_signing_key_init("generated");
            tracing::info!(
                target: "medtag.keys",
                key_id = %key_id,
                valid_until = %valid_until.to_rfc3339(),
                "Generated signing key"
            );
            Ok(())
        }
        Err(e) => {
            record_signing_key_init("error");
            Err(e)
        }
    }
}

/// The active key with its private half decrypted, ready for signing.
pub struct ActiveSigningKey {
    pub key_id: String,
    pub private_key_pkcs8: SecretBox<Vec<u8>>,
}

pub async fn load_active_signing_key(
    pool: &PgPool,
    master_key: &[u8],
) -> Result<ActiveSigningKey, ApiError> {
    let signing_key = signing_keys::get_active_key(pool)
        .await?
        .ok_or_else(|| ApiError::Crypto("No active signing key available".to_string()))?;

    let private_key_pkcs8 = decrypt_signing_key(&signing_key, master_key)?;

    Ok(ActiveSigningKey {
        key_id: signing_key.key_id,
        private_key_pkcs8: SecretBox::new(Box::new(private_key_pkcs8)),
    })
}

fn decrypt_signing_key(key: &SigningKey, master_key: &[u8]) -> Result<Vec<u8>, ApiError> {
    let encrypted = EncryptedKey {
        encrypted_data: SecretBox::new(Box::new(key.private_key_encrypted.clone())),
        nonce: key.encryption_nonce.clone(),
        tag: key.encryption_tag.clone(),
    };
    crypto::decrypt_with_master_key(&encrypted, master_key)
}

/// Public key PEM for a `kid`, if that key is still valid.
pub async fn public_key_for(pool: &PgPool, key_id: &str) -> Result<Option<String>, ApiError> {
    Ok(signing_keys::get_by_key_id(pool, key_id)
        .await?
        .map(|key| key.public_key))
}
