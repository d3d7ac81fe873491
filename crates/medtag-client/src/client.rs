//! HTTP client with the token refresh interceptor.
//!
//! Every authenticated call goes through [`ApiClient::send_authenticated`]:
//!
//! 1. The stored access token is attached as a bearer token.
//! 2. A non-401 response is returned as is.
//! 3. On 401 the refresh lock is taken. If another task already replaced the
//!    access token this request used, its token is reused; otherwise the
//!    refresh token is exchanged at `/auth/refresh`.
//! 4. The request is retried exactly once with the new token.
//! 5. A failed refresh, a missing refresh token or a second 401 clears the
//!    session and yields [`ClientError::SessionExpired`].
//!
//! Public calls (login, register, scan, emergency lookup) bypass the
//! interceptor entirely.

use crate::api::{AuditApi, AuthApi, NfcApi, ProfileApi};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::{Session, SessionStore};
use common::api::{RefreshRequest, RefreshResponse};
use common::error::ErrorBody;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    store: Arc<dyn SessionStore>,
    /// Serializes refreshes so concurrent 401s exchange the refresh token once.
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            store,
            refresh_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn profile(&self) -> ProfileApi<'_> {
        ProfileApi::new(self)
    }

    pub fn nfc(&self) -> NfcApi<'_> {
        NfcApi::new(self)
    }

    pub fn audit(&self) -> AuditApi<'_> {
        AuditApi::new(self)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    pub(crate) fn save_session(&self, session: &Session) -> Result<(), ClientError> {
        self.store.save(session)
    }

    pub(crate) fn clear_session(&self) -> Result<(), ClientError> {
        self.store.clear()
    }

    // ------------------------------------------------------------------
    // Typed helpers
    // ------------------------------------------------------------------

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        let response = self.send_authenticated(|http| http.get(&url)).await?;
        decode(response).await
    }

    pub(crate) async fn get_with_query<Q, T>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .send_authenticated(|http| http.get(&url).query(query))
            .await?;
        decode(response).await
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .send_authenticated(|http| http.post(&url).json(body))
            .await?;
        decode(response).await
    }

    pub(crate) async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .send_authenticated(|http| http.put(&url).json(body))
            .await?;
        decode(response).await
    }

    pub(crate) async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .send_authenticated(|http| http.patch(&url).json(body))
            .await?;
        decode(response).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let url = self.url(path);
        let response = self.send_authenticated(|http| http.delete(&url)).await?;
        expect_success(response).await
    }

    /// POST without credentials and without the interceptor.
    pub(crate) async fn post_public<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        decode(response).await
    }

    /// GET without credentials and without the interceptor.
    pub(crate) async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        decode(response).await
    }

    // ------------------------------------------------------------------
    // Interceptor
    // ------------------------------------------------------------------

    /// Send a request built by `build`, refreshing the session and retrying
    /// once on 401. `build` is called again for the retry.
    #[instrument(skip_all)]
    pub async fn send_authenticated<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let used_access = self
            .store
            .load()?
            .map(|session| session.access.expose_secret().to_string());

        let response = self.dispatch(&build, used_access.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(target: "medtag.client", "Access token rejected, refreshing session");
        let access = self.refresh_after_unauthorized(used_access.as_deref()).await?;

        let retried = self.dispatch(&build, Some(access.expose_secret())).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(target: "medtag.client", "Request rejected after refresh, ending session");
            self.expire_session()?;
            return Err(ClientError::SessionExpired);
        }
        Ok(retried)
    }

    async fn dispatch<F>(&self, build: &F, access: Option<&str>) -> Result<Response, ClientError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut request = build(&self.http);
        if let Some(token) = access {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// The access token to retry with.
    async fn refresh_after_unauthorized(
        &self,
        used_access: Option<&str>,
    ) -> Result<SecretString, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let Some(mut session) = self.store.load()? else {
            return Err(ClientError::SessionExpired);
        };

        if used_access != Some(session.access.expose_secret()) {
            debug!(target: "medtag.client", "Session already refreshed by a concurrent request");
            return Ok(session.access);
        }

        let Some(refresh) = session.refresh.as_ref() else {
            debug!(target: "medtag.client", "No refresh token, ending session");
            self.expire_session()?;
            return Err(ClientError::SessionExpired);
        };

        match self.exchange_refresh_token(refresh).await {
            Ok(access) => {
                session.access = access.clone();
                self.store.save(&session)?;
                debug!(target: "medtag.client", "Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(target: "medtag.client", error = %e, "Token refresh failed, ending session");
                self.expire_session()?;
                Err(ClientError::SessionExpired)
            }
        }
    }

    /// POST the refresh token to `/auth/refresh`. Goes straight to the HTTP
    /// client so a 401 here cannot recurse into another refresh.
    async fn exchange_refresh_token(
        &self,
        refresh: &SecretString,
    ) -> Result<SecretString, ClientError> {
        let body = RefreshRequest {
            refresh: refresh.expose_secret().to_string(),
        };
        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&body)
            .send()
            .await?;
        let refreshed: RefreshResponse = decode(response).await?;
        Ok(SecretString::from(refreshed.access))
    }

    fn expire_session(&self) -> Result<(), ClientError> {
        self.store.clear()
    }
}

/// Map a response to `T`, or to `ClientError::Api` for non-2xx statuses.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

async fn expect_success(response: Response) -> Result<(), ClientError> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let err = match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(envelope) => ClientError::Api {
            status: status.as_u16(),
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: format!("HTTP_{}", status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string(),
        },
    };
    debug!(target: "medtag.client", status = %status, error = %err, "Request failed");
    Err(err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use common::api::UserInfo;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, session: Option<Session>) -> (ApiClient, Arc<MemorySessionStore>) {
        let store = Arc::new(match session {
            Some(session) => MemorySessionStore::with_session(session),
            None => MemorySessionStore::new(),
        });
        let config = ClientConfig::default().with_base_url(&format!("{}/api/v1", server.uri()));
        let client = ApiClient::new(config, store.clone()).unwrap();
        (client, store)
    }

    fn user_json() -> serde_json::Value {
        serde_json::json!({
            "user_id": "00000000-0000-0000-0000-000000000064",
            "email": "anna@example.com",
            "phone": null,
            "first_name": "Anna",
            "last_name": "Ivanova",
            "middle_name": null,
            "full_name": "Ivanova Anna",
            "role": "PATIENT",
            "is_active": true,
            "is_verified": false,
            "two_factor_enabled": false,
            "date_joined": "2026-01-05T10:00:00Z",
            "last_login": null
        })
    }

    fn stored_access(store: &MemorySessionStore) -> Option<String> {
        store
            .load()
            .unwrap()
            .map(|s| s.access.expose_secret().to_string())
    }

    #[tokio::test]
    async fn test_request_carries_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some(Session::new("access-1", Some("refresh-1"))));

        let me: UserInfo = client.get("/auth/me").await.unwrap();
        assert_eq!(me.email, "anna@example.com");
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .and(body_json(serde_json::json!({ "refresh": "refresh-1" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "fresh" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("stale", Some("refresh-1"))));

        let me: UserInfo = client.get("/auth/me").await.unwrap();

        assert_eq!(me.first_name, "Anna");
        assert_eq!(stored_access(&store).as_deref(), Some("fresh"));
        // The refresh token is kept
        let session = store.load().unwrap().unwrap();
        assert_eq!(
            session.refresh.map(|r| r.expose_secret().to_string()).as_deref(),
            Some("refresh-1")
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/profiles"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": "INVALID_TOKEN", "message": "Refresh token is invalid or expired" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("stale", Some("revoked"))));

        let result: Result<serde_json::Value, _> = client.get("/profiles").await;

        assert!(matches!(result, Err(ClientError::SessionExpired)));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_not_retried_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nfc/tags"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "fresh" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("stale", Some("refresh-1"))));

        let result: Result<Vec<serde_json::Value>, _> = client.get("/nfc/tags").await;

        assert!(matches!(result, Err(ClientError::SessionExpired)));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_expires_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("stale", None)));

        let result: Result<UserInfo, _> = client.get("/auth/me").await;

        assert!(matches!(result, Err(ClientError::SessionExpired)));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_requests_refresh_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": "fresh" }))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("stale", Some("refresh-1"))));

        let (first, second) = tokio::join!(
            client.get::<UserInfo>("/auth/me"),
            client.get::<UserInfo>("/auth/me")
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(stored_access(&store).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_error_envelope_mapped_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/profiles"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": "NOT_FOUND", "message": "Medical profile not found" }
            })))
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("access-1", Some("refresh-1"))));

        let result: Result<serde_json::Value, _> = client.get("/profiles").await;

        match result {
            Err(ClientError::Api { status, code, message }) => {
                assert_eq!(status, 404);
                assert_eq!(code, "NOT_FOUND");
                assert_eq!(message, "Medical profile not found");
            }
            other => panic!("expected Api error, got {:?}", other.map(|_| ())),
        }
        // Non-401 errors leave the session alone
        assert!(store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_non_json_error_body_mapped_by_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/profiles/allergies/x"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, Some(Session::new("access-1", None)));

        let result = client.delete("/profiles/allergies/x").await;

        assert_eq!(result.unwrap_err().code(), Some("HTTP_502"));
    }

    #[tokio::test]
    async fn test_public_call_bypasses_interceptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nfc/emergency/00000000-0000-0000-0000-000000000001"))
            .and(|req: &wiremock::Request| !req.headers.contains_key("authorization"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server, Some(Session::new("access-1", Some("refresh-1"))));

        let result: Result<serde_json::Value, _> = client
            .get_public("/nfc/emergency/00000000-0000-0000-0000-000000000001")
            .await;

        assert!(matches!(result, Err(ClientError::Api { status: 401, .. })));
        assert!(store.load().unwrap().is_some());
    }
}
