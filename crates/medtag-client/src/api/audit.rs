//! `/audit` endpoints. `logs` and `security_events` are admin-only.

use crate::client::ApiClient;
use crate::error::ClientError;
use common::api::{AuditLog, AuditLogFilter, Page, SecurityEvent, SecurityEventFilter};

pub struct AuditApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuditApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLog>, ClientError> {
        self.client.get_with_query("/audit/logs", filter).await
    }

    pub async fn security_events(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, ClientError> {
        self.client
            .get_with_query("/audit/security-events", filter)
            .await
    }

    pub async fn my_logs(&self, page: Page) -> Result<Vec<AuditLog>, ClientError> {
        self.client.get_with_query("/audit/my-logs", &page).await
    }
}
