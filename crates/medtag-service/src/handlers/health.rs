//! Liveness and readiness probes.
//!
//! - `/health`: the process is up
//! - `/ready`: the database answers and an active signing key exists

use crate::models::ReadinessResponse;
use crate::repositories::signing_keys;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

pub async fn health_check() -> &'static str {
    "OK"
}

fn not_ready(database: &'static str, signing_key: Option<&'static str>) -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            status: "not_ready",
            database: Some(database),
            signing_key,
            // Details stay in the server log
            error: Some("Service dependencies unavailable".to_string()),
        }),
    )
}

/// Returns 503 naming the failing component. Tokens cannot be issued
/// without a signing key, so a missing key is not ready either.
#[tracing::instrument(skip_all, name = "medtag.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        tracing::warn!(target: "medtag.health", error = %e, "Readiness check failed: database error");
        return not_ready("unhealthy", None);
    }

    match signing_keys::get_active_key(&state.pool).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(target: "medtag.health", "Readiness check failed: no active signing key");
            return not_ready("healthy", Some("unavailable"));
        }
        Err(e) => {
            tracing::warn!(target: "medtag.health", error = %e, "Readiness check failed: signing key lookup");
            return not_ready("healthy", Some("unavailable"));
        }
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            signing_key: Some("available"),
            error: None,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[test]
    fn test_not_ready_omits_missing_components() {
        let (status, Json(body)) = not_ready("unhealthy", None);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"status\":\"not_ready\""));
        assert!(json.contains("\"database\":\"unhealthy\""));
        assert!(!json.contains("signing_key"));
    }
}
