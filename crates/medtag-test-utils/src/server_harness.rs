//! Test server harness for E2E testing
//!
//! Provides `TestServer` for spawning the real MedTag router in tests.

use crate::test_ids::{TEST_MASTER_KEY_B64, TEST_TAG_KEY_B64};
use common::secret::ExposeSecret;
use medtag_service::config::Config;
use medtag_service::observability::metrics::init_metrics_recorder;
use medtag_service::routes::{self, AppState};
use medtag_service::services::key_management_service;
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the MedTag server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_health_flow_e2e(pool: PgPool) -> Result<()> {
///     let server = TestServer::spawn(pool).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    _handle: JoinHandle<()>,
}

/// Configuration used by every test server: fixed keys, the cheapest
/// allowed bcrypt cost, forwarded-for trusted so tests can pick client IPs.
pub fn test_config() -> Result<Config, anyhow::Error> {
    let vars = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgresql://test/test".to_string(),
        ),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("MEDTAG_MASTER_KEY".to_string(), TEST_MASTER_KEY_B64.to_string()),
        ("MEDTAG_TAG_KEY".to_string(), TEST_TAG_KEY_B64.to_string()),
        ("BCRYPT_COST".to_string(), "10".to_string()),
        ("TRUST_FORWARDED_FOR".to_string(), "true".to_string()),
    ]);

    Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))
}

impl TestServer {
    /// Spawn a server on a random local port against `pool` (typically
    /// from `#[sqlx::test]`). A signing key is created first, as the real
    /// binary does at startup.
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        let config = test_config()?;

        key_management_service::initialize_signing_key(&pool, config.master_key.expose_secret())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize signing key: {}", e))?;

        // The global recorder can only be installed once per process; later
        // servers get a standalone recorder.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
        });

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            _handle: handle,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL of the versioned API, as the client expects it.
    pub fn api_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
