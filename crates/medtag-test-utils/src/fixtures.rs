//! Data fixtures created through the service layer, so rows carry the same
//! invariants as data written through the API.

use crate::server_harness::TestServer;
use crate::test_ids::TEST_PASSWORD;
use common::api::{MedicalProfile, ProfileInput, RegisterTagRequest, RegisterTagResponse};
use common::types::Role;
use medtag_service::crypto;
use medtag_service::models::{ClientMeta, User};
use medtag_service::repositories::users::{self, NewUser};
use medtag_service::services::{nfc_service, profile_service, token_service};

/// An account with a live token pair.
#[derive(Clone)]
pub struct TestUser {
    pub user: User,
    pub access: String,
    pub refresh: String,
}

impl TestUser {
    /// `Authorization` header value for this user.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access)
    }
}

impl TestServer {
    /// Create an active account with password [`TEST_PASSWORD`] and issue
    /// it a token pair.
    pub async fn create_user(&self, email: &str, role: Role) -> Result<TestUser, anyhow::Error> {
        let password_hash = crypto::hash_password(TEST_PASSWORD, self.config().bcrypt_cost)?;
        let user = users::create_user(
            self.pool(),
            &NewUser {
                email,
                password_hash: &password_hash,
                first_name: "Anna",
                last_name: "Ivanova",
                middle_name: None,
                phone: None,
                role,
            },
        )
        .await?;

        let pair = token_service::issue_token_pair(
            self.pool(),
            self.config(),
            &user,
            &ClientMeta::default(),
            "login",
        )
        .await?;

        Ok(TestUser {
            user,
            access: pair.access,
            refresh: pair.refresh,
        })
    }

    pub async fn create_patient(&self, email: &str) -> Result<TestUser, anyhow::Error> {
        self.create_user(email, Role::Patient).await
    }

    /// A public profile with no medical data yet.
    pub async fn create_profile(&self, owner: &TestUser) -> Result<MedicalProfile, anyhow::Error> {
        let profile = profile_service::create_profile(
            self.pool(),
            owner.user.user_id,
            &ProfileInput::default(),
        )
        .await?;
        Ok(profile)
    }

    /// Register a tag for `owner`, who must already have a profile.
    pub async fn register_tag(
        &self,
        owner: &TestUser,
        tag_uid: &str,
    ) -> Result<RegisterTagResponse, anyhow::Error> {
        let response = nfc_service::register_tag(
            self.pool(),
            self.config(),
            &owner.user,
            &RegisterTagRequest {
                tag_uid: tag_uid.to_string(),
                tag_type: None,
            },
            &ClientMeta::default(),
        )
        .await?;
        Ok(response)
    }
}
