//! `/nfc` endpoints. `scan` and `emergency` are public first-responder
//! calls and never carry the session.

use crate::client::ApiClient;
use crate::error::ClientError;
use common::api::{
    EmergencyAccess, NfcAccessLog, NfcTag, Page, RegisterTagRequest, RegisterTagResponse,
    RevokeTagRequest, RevokeTagResponse, ScanRequest, ScanResponse,
};
use uuid::Uuid;

pub struct NfcApi<'a> {
    client: &'a ApiClient,
}

impl<'a> NfcApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn tags(&self) -> Result<Vec<NfcTag>, ClientError> {
        self.client.get("/nfc/tags").await
    }

    pub async fn register(&self, request: &RegisterTagRequest) -> Result<RegisterTagResponse, ClientError> {
        self.client.post("/nfc/register", request).await
    }

    pub async fn revoke(
        &self,
        tag_id: Uuid,
        reason: Option<String>,
    ) -> Result<RevokeTagResponse, ClientError> {
        self.client
            .post("/nfc/revoke", &RevokeTagRequest { tag_id, reason })
            .await
    }

    /// Access logs of the caller's tags; every tag for admins.
    pub async fn access_logs(&self, page: Page) -> Result<Vec<NfcAccessLog>, ClientError> {
        self.client.get_with_query("/nfc/access-logs", &page).await
    }

    pub async fn emergency_accesses(&self, page: Page) -> Result<Vec<EmergencyAccess>, ClientError> {
        self.client
            .get_with_query("/nfc/emergency-accesses", &page)
            .await
    }

    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResponse, ClientError> {
        self.client.post_public("/nfc/scan", request).await
    }

    /// Emergency data by tag id, as encoded in the printed QR code.
    pub async fn emergency(&self, tag_id: Uuid) -> Result<ScanResponse, ClientError> {
        self.client
            .get_public(&format!("/nfc/emergency/{}", tag_id))
            .await
    }
}
