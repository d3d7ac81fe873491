//! `/auth` endpoints. Login, registration and 2FA verification store the
//! returned session; logout always clears it.

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::session::Session;
use common::api::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    OtpRequest, RegisterRequest, TokenPair, TwoFactorSetupResponse, TwoFactorVerifyRequest,
    UpdateUserRequest, UserInfo,
};
use common::secret::ExposeSecret;
use uuid::Uuid;

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    fn store_pair(&self, pair: &TokenPair) -> Result<(), ClientError> {
        self.client.save_session(&Session::from_token_pair(pair))
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<TokenPair, ClientError> {
        let pair: TokenPair = self.client.post_public("/auth/register", request).await?;
        self.store_pair(&pair)?;
        tracing::info!(target: "medtag.client.auth", user_id = %pair.user.user_id, "Registered");
        Ok(pair)
    }

    /// Password login. A [`LoginResponse::TwoFactorRequired`] stores nothing;
    /// finish with [`AuthApi::verify_two_factor`].
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.client.post_public("/auth/login", &request).await?;

        match &response {
            LoginResponse::Authenticated(pair) => {
                self.store_pair(pair)?;
                tracing::info!(target: "medtag.client.auth", user_id = %pair.user.user_id, "Logged in");
            }
            LoginResponse::TwoFactorRequired(challenge) => {
                tracing::info!(
                    target: "medtag.client.auth",
                    user_id = %challenge.user_id,
                    "Two-factor code required"
                );
            }
        }
        Ok(response)
    }

    pub async fn verify_two_factor(
        &self,
        user_id: Uuid,
        otp_code: &str,
    ) -> Result<TokenPair, ClientError> {
        let request = TwoFactorVerifyRequest {
            user_id,
            otp_code: otp_code.to_string(),
        };
        let pair: TokenPair = self.client.post_public("/auth/2fa/verify", &request).await?;
        self.store_pair(&pair)?;
        Ok(pair)
    }

    /// Revoke the refresh token server-side, then drop the local session.
    /// The local session is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(session) = self.client.store().load()? {
            let request = LogoutRequest {
                refresh: session.refresh.map(|r| r.expose_secret().to_string()),
            };
            let result: Result<MessageResponse, ClientError> =
                self.client.post("/auth/logout", &request).await;
            if let Err(e) = result {
                tracing::warn!(target: "medtag.client.auth", error = %e, "Server logout failed");
            }
        }
        self.client.clear_session()
    }

    pub async fn me(&self) -> Result<UserInfo, ClientError> {
        self.client.get("/auth/me").await
    }

    pub async fn update_me(&self, request: &UpdateUserRequest) -> Result<UserInfo, ClientError> {
        self.client.patch("/auth/me", request).await
    }

    pub async fn change_password(
        &self,
        request: &ChangePasswordRequest,
    ) -> Result<MessageResponse, ClientError> {
        self.client.post("/auth/change-password", request).await
    }

    pub async fn two_factor_setup(&self) -> Result<TwoFactorSetupResponse, ClientError> {
        self.client.get("/auth/2fa/enable").await
    }

    pub async fn two_factor_confirm(&self, otp_code: &str) -> Result<MessageResponse, ClientError> {
        let request = OtpRequest {
            otp_code: otp_code.to_string(),
        };
        self.client.post("/auth/2fa/enable", &request).await
    }
}
