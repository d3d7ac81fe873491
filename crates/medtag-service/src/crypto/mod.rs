//! Cryptographic primitives: access token signing, key encryption at rest,
//! password hashing, refresh tokens and tag checksums.

pub mod totp;

use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::ApiError;
use crate::observability::metrics::record_token_validation;
use base64::{engine::general_purpose, Engine as _};
use common::secret::{ExposeSecret, SecretBox, SecretString};
use common::types::Role;
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::instrument;
use uuid::Uuid;

/// Maximum allowed JWT size in bytes (4KB).
///
/// Checked before base64 decoding and signature verification so oversized
/// bearer headers are rejected with minimal work.
pub const MAX_JWT_SIZE_BYTES: usize = 4096;

/// Bcrypt hash verified when the email is unknown, so both paths cost the same.
pub const DUMMY_PASSWORD_HASH: &str =
    "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// Refresh tokens are this many random bytes before encoding.
const REFRESH_TOKEN_BYTES: usize = 32;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

type HmacSha256 = Hmac<Sha256>;

/// Access token claims.
///
/// `sub` and `email` identify a person and are redacted from Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (user UUID)
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
}

impl UserClaims {
    /// Parse `sub` back into the user id.
    pub fn user_id(&self) -> Result<Uuid, ApiError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| ApiError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()))
    }
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("sub", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("role", &self.role)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("jti", &"[REDACTED]")
            .finish()
    }
}

/// Ciphertext produced under the master key (AES-256-GCM).
///
/// Debug is manually implemented to redact all cryptographic material.
/// Clone is manually implemented because SecretBox requires explicit cloning.
pub struct EncryptedKey {
    pub encrypted_data: SecretBox<Vec<u8>>,
    pub nonce: Vec<u8>, // 96-bit (12 bytes)
    pub tag: Vec<u8>,   // 128-bit (16 bytes)
}

impl Clone for EncryptedKey {
    fn clone(&self) -> Self {
        Self {
            encrypted_data: SecretBox::new(Box::new(self.encrypted_data.expose_secret().clone())),
            nonce: self.nonce.clone(),
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Debug for EncryptedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKey")
            .field("encrypted_data", &"[REDACTED]")
            .field("nonce", &"[REDACTED]")
            .field("tag", &"[REDACTED]")
            .finish()
    }
}

/// Generate an Ed25519 keypair.
///
/// Returns (public_key_pem, private_key_pkcs8)
#[instrument(skip_all)]
pub fn generate_signing_key() -> Result<(String, Vec<u8>), ApiError> {
    let rng = SystemRandom::new();

    let pkcs8_bytes = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|e| ApiError::Crypto(format!("Keypair generation failed: {}", e)))?;

    let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8_bytes.as_ref())
        .map_err(|e| ApiError::Crypto(format!("Keypair parsing failed: {}", e)))?;

    let public_key_pem = format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----",
        general_purpose::STANDARD.encode(key_pair.public_key().as_ref())
    );

    Ok((public_key_pem, pkcs8_bytes.as_ref().to_vec()))
}

/// Encrypt with AES-256-GCM under the master key.
///
/// Uses a 96-bit random nonce and produces a 128-bit authentication tag.
#[instrument(skip_all)]
pub fn encrypt_with_master_key(plaintext: &[u8], master_key: &[u8]) -> Result<EncryptedKey, ApiError> {
    if master_key.len() != 32 {
        return Err(ApiError::Crypto(format!(
            "Invalid master key length: {} (expected 32)",
            master_key.len()
        )));
    }

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes)
        .map_err(|e| ApiError::Crypto(format!("Nonce generation failed: {}", e)))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| ApiError::Crypto(format!("Cipher key creation failed: {}", e)))?;
    let sealing_key = LessSafeKey::new(unbound_key);

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| ApiError::Crypto(format!("Encryption operation failed: {}", e)))?;

    // Buffer is ciphertext followed by the 16-byte tag
    let tag_start = in_out
        .len()
        .checked_sub(16)
        .ok_or_else(|| ApiError::Crypto("Encryption produced invalid output".to_string()))?;
    let tag = in_out.split_off(tag_start);

    Ok(EncryptedKey {
        encrypted_data: SecretBox::new(Box::new(in_out)),
        nonce: nonce_bytes.to_vec(),
        tag,
    })
}

/// Decrypt AES-256-GCM ciphertext produced by [`encrypt_with_master_key`].
#[instrument(skip_all)]
pub fn decrypt_with_master_key(
    encrypted: &EncryptedKey,
    master_key: &[u8],
) -> Result<Vec<u8>, ApiError> {
    if master_key.len() != 32 {
        return Err(ApiError::Crypto(format!(
            "Invalid master key length: {} (expected 32)",
            master_key.len()
        )));
    }

    if encrypted.tag.len() != 16 {
        return Err(ApiError::Crypto(format!(
            "Invalid tag length: {} (expected 16)",
            encrypted.tag.len()
        )));
    }

    let nonce_bytes: [u8; 12] = encrypted.nonce.as_slice().try_into().map_err(|_| {
        ApiError::Crypto(format!(
            "Invalid nonce length: {} (expected 12)",
            encrypted.nonce.len()
        ))
    })?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = encrypted.encrypted_data.expose_secret().clone();
    in_out.extend_from_slice(&encrypted.tag);

    let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
        .map_err(|e| ApiError::Crypto(format!("Cipher key creation failed: {}", e)))?;
    let opening_key = LessSafeKey::new(unbound_key);

    let decrypted = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| ApiError::Crypto(format!("Decryption operation failed: {}", e)))?;

    Ok(decrypted.to_vec())
}

/// Sign an access token with the EdDSA private key, tagging it with `kid`.
#[instrument(skip_all)]
pub fn sign_access_token(
    claims: &UserClaims,
    private_key_pkcs8: &[u8],
    key_id: &str,
) -> Result<String, ApiError> {
    Ed25519KeyPair::from_pkcs8(private_key_pkcs8)
        .map_err(|e| ApiError::Crypto(format!("Invalid private key format: {}", e)))?;

    let encoding_key = EncodingKey::from_ed_der(private_key_pkcs8);

    let mut header = Header::new(Algorithm::EdDSA);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key_id.to_string());

    encode(&header, claims, &encoding_key)
        .map_err(|e| ApiError::Crypto(format!("JWT signing operation failed: {}", e)))
}

/// Extract the `kid` from a JWT header without verifying the signature.
///
/// Only used to pick the verification key. The token MUST still be verified.
pub fn extract_jwt_kid(token: &str) -> Option<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    if token.len() > MAX_JWT_SIZE_BYTES {
        return None;
    }

    let mut parts = token.split('.');
    let header_b64 = parts.next()?;
    if parts.count() != 2 {
        return None;
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_b64).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&header_bytes).ok()?;

    header.get("kid")?.as_str().map(|s| s.to_string())
}

/// Verify an access token and return its claims.
///
/// Validates:
/// - Token size (must be <= MAX_JWT_SIZE_BYTES)
/// - Signature (EdDSA/Ed25519)
/// - Expiration (`exp` claim)
/// - Issued-at time (`iat` claim) no further ahead than `clock_skew_seconds`
#[instrument(skip_all)]
pub fn verify_access_token(
    token: &str,
    public_key_pem: &str,
    clock_skew_seconds: i64,
) -> Result<UserClaims, ApiError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "medtag.crypto",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        record_token_validation("error", Some("oversized"));
        return Err(ApiError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()));
    }

    let public_key_b64 = public_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<String>();

    let public_key_bytes = general_purpose::STANDARD
        .decode(&public_key_b64)
        .map_err(|e| {
            tracing::debug!(target: "medtag.crypto", error = %e, "Invalid public key encoding");
            ApiError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
        })?;

    let decoding_key = DecodingKey::from_ed_der(&public_key_bytes);

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<UserClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "medtag.crypto", error = %e, "Token verification failed");
        record_token_validation("error", Some("signature_or_expiry"));
        ApiError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
    })?;

    let now = chrono::Utc::now().timestamp();
    let max_iat = now + clock_skew_seconds;

    if token_data.claims.iat > max_iat {
        tracing::debug!(
            target: "medtag.crypto",
            iat = token_data.claims.iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        record_token_validation("error", Some("clock_skew"));
        return Err(ApiError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()));
    }

    record_token_validation("success", None);
    Ok(token_data.claims)
}

/// Hash a password with bcrypt.
///
/// Cost is re-validated here even though configuration already did.
#[instrument(skip_all)]
pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(ApiError::Crypto(format!(
            "Invalid bcrypt cost: {} (must be {}-{})",
            cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
        )));
    }

    bcrypt::hash(password, cost)
        .map_err(|e| ApiError::Crypto(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a bcrypt hash
#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::Crypto(format!("Password verification failed: {}", e)))
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, ApiError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| ApiError::Crypto(format!("Random bytes generation failed: {}", e)))?;
    Ok(bytes)
}

/// Generate an opaque refresh token (32 random bytes, URL-safe base64).
pub fn generate_refresh_token() -> Result<SecretString, ApiError> {
    let bytes = generate_random_bytes(REFRESH_TOKEN_BYTES)?;
    Ok(SecretString::from(
        general_purpose::URL_SAFE_NO_PAD.encode(bytes),
    ))
}

/// SHA-256 of a refresh token, hex encoded. Only this hash is stored.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Tag checksum: hex(HMAC-SHA256(tag_key, tag_uid || public_key_id)).
pub fn tag_checksum(tag_key: &[u8], tag_uid: &str, public_key_id: &Uuid) -> Result<String, ApiError> {
    let mac = tag_mac(tag_key, tag_uid, public_key_id)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a checksum read from a tag.
pub fn verify_tag_checksum(
    tag_key: &[u8],
    tag_uid: &str,
    public_key_id: &Uuid,
    candidate: &str,
) -> Result<bool, ApiError> {
    let Ok(candidate_bytes) = hex::decode(candidate) else {
        return Ok(false);
    };
    let mac = tag_mac(tag_key, tag_uid, public_key_id)?;
    Ok(mac.verify_slice(&candidate_bytes).is_ok())
}

fn tag_mac(tag_key: &[u8], tag_uid: &str, public_key_id: &Uuid) -> Result<HmacSha256, ApiError> {
    let mut mac = HmacSha256::new_from_slice(tag_key)
        .map_err(|e| ApiError::Crypto(format!("Invalid tag key: {}", e)))?;
    mac.update(tag_uid.as_bytes());
    mac.update(public_key_id.to_string().as_bytes());
    Ok(mac)
}
