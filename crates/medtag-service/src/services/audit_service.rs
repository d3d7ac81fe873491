//! Audit trail: best-effort writes from the rest of the service, and the
//! paged reads behind `/api/v1/audit`.
//!
//! Writes never fail the request that triggered them. A failed insert is
//! logged at warn level and counted in `medtag_audit_log_failures_total`.

use crate::errors::ApiError;
use crate::models::ClientMeta;
use crate::observability::metrics::record_audit_log_failure;
use crate::repositories::audit_logs::{self, NewAuditLog};
use crate::repositories::nfc_access_logs::{self, NewAccessLog};
use crate::repositories::security_events::{self, NewSecurityEvent};
use common::api::{AuditLog, AuditLogFilter, Page, SecurityEvent, SecurityEventFilter};
use sqlx::PgPool;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Resolve optional paging parameters to a bounded `(limit, offset)`.
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

impl NewAuditLog {
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_meta(mut self, meta: &ClientMeta) -> Self {
        self.ip_address = meta.ip_address.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }
}

impl NewSecurityEvent {
    pub fn with_meta(mut self, meta: &ClientMeta) -> Self {
        self.ip_address = meta.ip_address.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }
}

pub async fn record(pool: &PgPool, log: NewAuditLog) {
    if let Err(e) = audit_logs::insert(pool, &log).await {
        tracing::warn!(
            target: "medtag.audit",
            error = %e,
            action = %log.action,
            "Failed to write audit log"
        );
        record_audit_log_failure("audit_log");
    }
}

pub async fn record_security_event(pool: &PgPool, event: NewSecurityEvent) {
    tracing::info!(
        target: "medtag.security",
        event_type = %event.event_type,
        severity = %event.severity,
        user_id = ?event.user_id,
        "Security event"
    );

    if let Err(e) = security_events::insert(pool, &event).await {
        tracing::warn!(
            target: "medtag.audit",
            error = %e,
            event_type = %event.event_type,
            "Failed to write security event"
        );
        record_audit_log_failure("security_event");
    }
}

pub async fn record_access_log(pool: &PgPool, log: &NewAccessLog<'_>) {
    if let Err(e) = nfc_access_logs::insert(pool, log).await {
        tracing::warn!(
            target: "medtag.audit",
            error = %e,
            access_type = %log.access_type,
            status = %log.status,
            "Failed to write NFC access log"
        );
        record_audit_log_failure("access_log");
    }
}

/// All audit rows matching `filter` (admin view).
pub async fn list_logs(pool: &PgPool, filter: &AuditLogFilter) -> Result<Vec<AuditLog>, ApiError> {
    let (limit, offset) = clamp_page(filter.limit, filter.offset);
    audit_logs::list(pool, filter, limit, offset).await
}

/// The caller's own audit rows.
pub async fn list_user_logs(
    pool: &PgPool,
    user_id: Uuid,
    page: Page,
) -> Result<Vec<AuditLog>, ApiError> {
    let filter = AuditLogFilter {
        user_id: Some(user_id),
        ..AuditLogFilter::default()
    };
    let (limit, offset) = clamp_page(page.limit, page.offset);
    audit_logs::list(pool, &filter, limit, offset).await
}

pub async fn list_security_events(
    pool: &PgPool,
    filter: &SecurityEventFilter,
) -> Result<Vec<SecurityEvent>, ApiError> {
    let (limit, offset) = clamp_page(filter.limit, filter.offset);
    security_events::list(pool, filter, limit, offset).await
}
