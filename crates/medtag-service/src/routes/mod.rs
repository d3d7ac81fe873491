//! HTTP routes for the MedTag service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers::{
    self, audit_handler as audit, auth_handler as auth, nfc_handler as nfc,
    profile_handler as profile,
};
use crate::middleware::{
    attach_client_meta, audit_requests, http_metrics_middleware, require_admin, require_auth,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - operational, unversioned
/// - `/api/v1/auth/*` - registration, login, tokens, 2FA
/// - `/api/v1/profiles/*` - the caller's medical profile (authenticated)
/// - `/api/v1/nfc/*` - tags; `scan` and `emergency/:tag_id` are public
/// - `/api/v1/audit/*` - audit trail; `logs` and `security-events` need an admin
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/auth/register", post(auth::handle_register))
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/2fa/verify", post(auth::handle_verify_two_factor))
        .route("/api/v1/auth/refresh", post(auth::handle_refresh))
        .route("/api/v1/nfc/scan", post(nfc::handle_scan))
        .route("/api/v1/nfc/emergency/:tag_id", get(nfc::handle_emergency))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        // Account
        .route("/api/v1/auth/logout", post(auth::handle_logout))
        .route(
            "/api/v1/auth/me",
            get(auth::handle_get_me).patch(auth::handle_update_me),
        )
        .route("/api/v1/auth/change-password", post(auth::handle_change_password))
        .route(
            "/api/v1/auth/2fa/enable",
            get(auth::handle_two_factor_setup).post(auth::handle_two_factor_confirm),
        )
        // Medical profile
        .route(
            "/api/v1/profiles",
            get(profile::handle_get_profile)
                .post(profile::handle_create_profile)
                .put(profile::handle_update_profile),
        )
        .route(
            "/api/v1/profiles/allergies",
            get(profile::handle_list_allergies).post(profile::handle_create_allergy),
        )
        .route(
            "/api/v1/profiles/allergies/:id",
            get(profile::handle_get_allergy)
                .put(profile::handle_update_allergy)
                .delete(profile::handle_delete_allergy),
        )
        .route(
            "/api/v1/profiles/chronic-diseases",
            get(profile::handle_list_diseases).post(profile::handle_create_disease),
        )
        .route(
            "/api/v1/profiles/chronic-diseases/:id",
            get(profile::handle_get_disease)
                .put(profile::handle_update_disease)
                .delete(profile::handle_delete_disease),
        )
        .route(
            "/api/v1/profiles/medications",
            get(profile::handle_list_medications).post(profile::handle_create_medication),
        )
        .route(
            "/api/v1/profiles/medications/:id",
            get(profile::handle_get_medication)
                .put(profile::handle_update_medication)
                .delete(profile::handle_delete_medication),
        )
        .route(
            "/api/v1/profiles/emergency-contacts",
            get(profile::handle_list_contacts).post(profile::handle_create_contact),
        )
        .route(
            "/api/v1/profiles/emergency-contacts/:id",
            get(profile::handle_get_contact)
                .put(profile::handle_update_contact)
                .delete(profile::handle_delete_contact),
        )
        .route(
            "/api/v1/profiles/doctor-notes",
            get(profile::handle_list_notes).post(profile::handle_create_note),
        )
        .route(
            "/api/v1/profiles/doctor-notes/:id",
            get(profile::handle_get_note)
                .put(profile::handle_update_note)
                .delete(profile::handle_delete_note),
        )
        // NFC tags
        .route("/api/v1/nfc/tags", get(nfc::handle_list_tags))
        .route("/api/v1/nfc/register", post(nfc::handle_register_tag))
        .route("/api/v1/nfc/revoke", post(nfc::handle_revoke_tag))
        .route("/api/v1/nfc/access-logs", get(nfc::handle_access_logs))
        .route(
            "/api/v1/nfc/emergency-accesses",
            get(nfc::handle_emergency_accesses),
        )
        // Audit
        .route("/api/v1/audit/my-logs", get(audit::handle_my_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Layers run bottom-to-top, so require_auth runs before require_admin
    let admin_routes = Router::new()
        .route("/api/v1/audit/logs", get(audit::handle_list_logs))
        .route(
            "/api/v1/audit/security-events",
            get(audit::handle_list_security_events),
        )
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Layer order (bottom-to-top execution):
    // 1. audit_requests - sees the final status and the authenticated user
    // 2. attach_client_meta - resolves client IP before anything reads it
    // 3. TimeoutLayer / TraceLayer
    // 4. http_metrics_middleware - records ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), audit_requests))
        .layer(middleware::from_fn_with_state(state, attach_client_meta))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
