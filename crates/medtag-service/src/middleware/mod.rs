//! HTTP middleware for the MedTag service.
//!
//! - `client_meta` - resolves client IP and user agent for every request
//! - `auth` - bearer authentication and the admin gate
//! - `audit` - one audit row per `/api/` request
//! - `http_metrics` - request counters and latency for every response

pub mod audit;
pub mod auth;
pub mod client_meta;
pub mod http_metrics;

pub use audit::audit_requests;
pub use auth::{optional_user_id, require_admin, require_auth, AuthenticatedUserId};
pub use client_meta::attach_client_meta;
pub use http_metrics::http_metrics_middleware;
