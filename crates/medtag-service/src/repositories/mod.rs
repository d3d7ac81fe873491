//! Database access layer. One module per table group; every function takes a
//! `&PgPool` and maps driver errors to `ApiError::Database`.

pub mod audit_logs;
pub mod emergency_accesses;
pub mod login_attempts;
pub mod nfc_access_logs;
pub mod nfc_tags;
pub mod profiles;
pub mod refresh_tokens;
pub mod security_events;
pub mod signing_keys;
pub mod totp_devices;
pub mod users;
