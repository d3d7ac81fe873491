//! Metrics definitions for the MedTag service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `medtag_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status`: success, error (plus scan outcomes SUCCESS/FAILED/DENIED)
//! - `kind`: login, two_factor, refresh
//! - `path`: route template with ids replaced by `{id}`, or `/other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle served on `/metrics`.
///
/// Must be called once, before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("medtag_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // bcrypt dominates token issuance, so the buckets start coarse
        .set_buckets_for_metric(
            Matcher::Prefix("medtag_token_issuance".to_string()),
            &[0.050, 0.100, 0.200, 0.350, 0.500, 1.000, 2.000],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `medtag_http_requests_total`, `medtag_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("medtag_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("medtag_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Replace id segments with `{id}` and collapse unknown prefixes to `/other`.
fn normalize_path(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" => return path.to_string(),
        _ => {}
    }

    if !path.starts_with("/api/v1/") {
        return "/other".to_string();
    }

    path.split('/')
        .map(|segment| if is_uuid(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string matches UUID format (8-4-4-4-12 hex digits with dashes)
fn is_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }

    s.bytes().enumerate().all(|(i, byte)| match i {
        8 | 13 | 18 | 23 => byte == b'-',
        _ => byte.is_ascii_hexdigit(),
    })
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `medtag_token_issuance_duration_seconds`, `medtag_token_issuance_total`
/// Labels: `kind`, `status`
pub fn record_token_issuance(kind: &str, status: &str, duration: Duration) {
    histogram!("medtag_token_issuance_duration_seconds", "kind" => kind.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("medtag_token_issuance_total", "kind" => kind.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record access token validation result
///
/// Metric: `medtag_token_validations_total`
/// Labels: `status`, `error_category`
pub fn record_token_validation(status: &str, error_category: Option<&str>) {
    let category = error_category.unwrap_or("none");
    counter!("medtag_token_validations_total", "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

/// Record signing key initialization
///
/// Metric: `medtag_signing_key_init_total`
/// Labels: `outcome` (loaded, generated, error)
pub fn record_signing_key_init(outcome: &str) {
    counter!("medtag_signing_key_init_total", "outcome" => outcome.to_string()).increment(1);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

/// Record rate limit decision
///
/// Metric: `medtag_rate_limit_decisions_total`
/// Labels: `scope` (login, scan), `action` (allowed, rejected)
pub fn record_rate_limit_decision(scope: &str, action: &str) {
    counter!("medtag_rate_limit_decisions_total", "scope" => scope.to_string(), "action" => action.to_string())
        .increment(1);
}

// ============================================================================
// NFC Metrics
// ============================================================================

/// Record the outcome of a tag scan
///
/// Metric: `medtag_nfc_scans_total`
/// Labels: `status` (SUCCESS, FAILED, DENIED)
pub fn record_nfc_scan(status: &str) {
    counter!("medtag_nfc_scans_total", "status" => status.to_string()).increment(1);
}

/// Record a disclosure of emergency data (scan or QR lookup)
///
/// Metric: `medtag_emergency_accesses_total`
/// Labels: `channel` (nfc, qr)
pub fn record_emergency_access(channel: &str) {
    counter!("medtag_emergency_accesses_total", "channel" => channel.to_string()).increment(1);
}

// ============================================================================
// Audit Metrics
// ============================================================================

/// Record audit log write failure
///
/// Metric: `medtag_audit_log_failures_total`
/// Labels: `kind` (audit_log, security_event, access_log)
pub fn record_audit_log_failure(kind: &str) {
    counter!("medtag_audit_log_failures_total", "kind" => kind.to_string()).increment(1);
}
