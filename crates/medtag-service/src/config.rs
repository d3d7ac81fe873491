//! Service configuration.
//!
//! Loaded from environment variables. Key material is held in `SecretBox` and
//! redacted from Debug output.

use base64::{engine::general_purpose, Engine as _};
use common::secret::{ExposeSecret, SecretBox};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default bcrypt cost factor (2^12 iterations, roughly 200ms per hash).
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Lowest accepted bcrypt cost.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Highest accepted bcrypt cost.
pub const MAX_BCRYPT_COST: u32 = 14;

/// Default tolerance for `iat` claims issued slightly in the future.
pub const DEFAULT_JWT_CLOCK_SKEW_SECONDS: i64 = 300;

/// Upper bound for `JWT_CLOCK_SKEW_SECONDS`.
pub const MAX_JWT_CLOCK_SKEW_SECONDS: i64 = 600;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 900;

/// Access token lifetime bounds.
pub const MIN_ACCESS_TOKEN_TTL_SECONDS: i64 = 60;
pub const MAX_ACCESS_TOKEN_TTL_SECONDS: i64 = 86_400;

/// Default refresh token lifetime (1 day).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 86_400;

/// Minimum length of the tag checksum HMAC key.
pub const MIN_TAG_KEY_BYTES: usize = 32;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub struct Config {
    pub database_url: String,
    pub bind_address: String,

    /// AES-256-GCM key protecting signing keys and TOTP secrets (32 bytes).
    pub master_key: SecretBox<Vec<u8>>,

    /// HMAC-SHA256 key for tag checksums (at least 32 bytes).
    pub tag_key: SecretBox<Vec<u8>>,

    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub jwt_clock_skew_seconds: i64,
    pub bcrypt_cost: u32,

    /// Take the client IP from the first `X-Forwarded-For` entry.
    pub trust_forwarded_for: bool,

    pub log_format: LogFormat,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            database_url: self.database_url.clone(),
            bind_address: self.bind_address.clone(),
            master_key: SecretBox::new(Box::new(self.master_key.expose_secret().clone())),
            tag_key: SecretBox::new(Box::new(self.tag_key.expose_secret().clone())),
            access_token_ttl_seconds: self.access_token_ttl_seconds,
            refresh_token_ttl_seconds: self.refresh_token_ttl_seconds,
            jwt_clock_skew_seconds: self.jwt_clock_skew_seconds,
            bcrypt_cost: self.bcrypt_cost,
            trust_forwarded_for: self.trust_forwarded_for,
            log_format: self.log_format,
        }
    }
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("master_key", &"[REDACTED]")
            .field("tag_key", &"[REDACTED]")
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid master key format: {0}")]
    InvalidMasterKey(String),

    #[error("Invalid tag key format: {0}")]
    InvalidTagKey(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let master_key = general_purpose::STANDARD
            .decode(required(vars, "MEDTAG_MASTER_KEY")?)
            .map_err(ConfigError::Base64Error)?;
        if master_key.len() != 32 {
            return Err(ConfigError::InvalidMasterKey(format!(
                "Expected 32 bytes, got {}",
                master_key.len()
            )));
        }

        let tag_key = general_purpose::STANDARD
            .decode(required(vars, "MEDTAG_TAG_KEY")?)
            .map_err(ConfigError::Base64Error)?;
        if tag_key.len() < MIN_TAG_KEY_BYTES {
            return Err(ConfigError::InvalidTagKey(format!(
                "Expected at least {} bytes, got {}",
                MIN_TAG_KEY_BYTES,
                tag_key.len()
            )));
        }

        let access_token_ttl_seconds = parse_in_range(
            vars,
            "ACCESS_TOKEN_TTL_SECONDS",
            DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            MIN_ACCESS_TOKEN_TTL_SECONDS..=MAX_ACCESS_TOKEN_TTL_SECONDS,
        )?;

        let refresh_token_ttl_seconds = parse_in_range(
            vars,
            "REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            access_token_ttl_seconds..=i64::MAX,
        )?;

        let jwt_clock_skew_seconds = parse_in_range(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_JWT_CLOCK_SKEW_SECONDS,
            0..=MAX_JWT_CLOCK_SKEW_SECONDS,
        )?;

        let bcrypt_cost = parse_in_range(
            vars,
            "BCRYPT_COST",
            DEFAULT_BCRYPT_COST,
            MIN_BCRYPT_COST..=MAX_BCRYPT_COST,
        )?;

        let trust_forwarded_for = match vars.get("TRUST_FORWARDED_FOR").map(String::as_str) {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "TRUST_FORWARDED_FOR".to_string(),
                    reason: format!("expected true or false, got '{}'", other),
                })
            }
        };

        let log_format = match vars.get("LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "LOG_FORMAT".to_string(),
                    reason: format!("expected text or json, got '{}'", other),
                })
            }
        };

        Ok(Config {
            database_url,
            bind_address,
            master_key: SecretBox::new(Box::new(master_key)),
            tag_key: SecretBox::new(Box::new(tag_key)),
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            jwt_clock_skew_seconds,
            bcrypt_cost,
            trust_forwarded_for,
            log_format,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_in_range<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = raw.parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("'{}' is not a number", raw),
    })?;

    if !range.contains(&value) {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!(
                "{} is outside {}..={}",
                value,
                range.start(),
                range.end()
            ),
        });
    }

    Ok(value)
}

#[cfg(test)]
impl Config {
    /// Random keys and the cheapest bcrypt cost, for unit tests.
    pub(crate) fn for_tests() -> Self {
        let random_key = || {
            SecretBox::new(Box::new(
                crate::crypto::generate_random_bytes(32).unwrap_or_else(|_| vec![7u8; 32]),
            ))
        };
        Config {
            database_url: String::new(),
            bind_address: "127.0.0.1:0".to_string(),
            master_key: random_key(),
            tag_key: random_key(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            jwt_clock_skew_seconds: DEFAULT_JWT_CLOCK_SKEW_SECONDS,
            bcrypt_cost: MIN_BCRYPT_COST,
            trust_forwarded_for: true,
            log_format: LogFormat::Text,
        }
    }
}
