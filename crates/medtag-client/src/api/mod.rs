//! Typed wrappers over the REST endpoints, one per screen group.

mod audit;
mod auth;
mod nfc;
mod profile;

pub use audit::AuditApi;
pub use auth::AuthApi;
pub use nfc::NfcApi;
pub use profile::ProfileApi;
