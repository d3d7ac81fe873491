//! HTTP request handlers for the MedTag service.

pub mod audit_handler;
pub mod auth_handler;
pub mod health;
pub mod metrics;
pub mod nfc_handler;
pub mod profile_handler;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
