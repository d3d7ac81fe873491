//! `/profiles` endpoints: the medical profile and its sub-resources.

use crate::client::ApiClient;
use crate::error::ClientError;
use common::api::{
    Allergy, AllergyInput, ChronicDisease, ChronicDiseaseInput, DoctorNote, DoctorNoteInput,
    DoctorNoteUpdate, EmergencyContact, EmergencyContactInput, FullProfile, MedicalProfile,
    Medication, MedicationInput, ProfileInput,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

const ALLERGIES: &str = "/profiles/allergies";
const DISEASES: &str = "/profiles/chronic-diseases";
const MEDICATIONS: &str = "/profiles/medications";
const CONTACTS: &str = "/profiles/emergency-contacts";
const NOTES: &str = "/profiles/doctor-notes";

pub struct ProfileApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ProfileApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// The caller's profile with every sub-resource.
    pub async fn get(&self) -> Result<FullProfile, ClientError> {
        self.client.get("/profiles").await
    }

    pub async fn create(&self, input: &ProfileInput) -> Result<MedicalProfile, ClientError> {
        self.client.post("/profiles", input).await
    }

    /// Partial update; absent fields are left unchanged.
    pub async fn update(&self, input: &ProfileInput) -> Result<MedicalProfile, ClientError> {
        self.client.put("/profiles", input).await
    }

    async fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, ClientError> {
        self.client.get(collection).await
    }

    async fn add<B: Serialize, T: DeserializeOwned>(
        &self,
        collection: &str,
        input: &B,
    ) -> Result<T, ClientError> {
        self.client.post(collection, input).await
    }

    async fn replace<B: Serialize, T: DeserializeOwned>(
        &self,
        collection: &str,
        id: Uuid,
        input: &B,
    ) -> Result<T, ClientError> {
        self.client.put(&format!("{}/{}", collection, id), input).await
    }

    async fn remove(&self, collection: &str, id: Uuid) -> Result<(), ClientError> {
        self.client.delete(&format!("{}/{}", collection, id)).await
    }

    // Allergies

    pub async fn list_allergies(&self) -> Result<Vec<Allergy>, ClientError> {
        self.list(ALLERGIES).await
    }

    pub async fn add_allergy(&self, input: &AllergyInput) -> Result<Allergy, ClientError> {
        self.add(ALLERGIES, input).await
    }

    pub async fn update_allergy(&self, id: Uuid, input: &AllergyInput) -> Result<Allergy, ClientError> {
        self.replace(ALLERGIES, id, input).await
    }

    pub async fn delete_allergy(&self, id: Uuid) -> Result<(), ClientError> {
        self.remove(ALLERGIES, id).await
    }

    // Chronic diseases

    pub async fn list_diseases(&self) -> Result<Vec<ChronicDisease>, ClientError> {
        self.list(DISEASES).await
    }

    pub async fn add_disease(&self, input: &ChronicDiseaseInput) -> Result<ChronicDisease, ClientError> {
        self.add(DISEASES, input).await
    }

    pub async fn update_disease(
        &self,
        id: Uuid,
        input: &ChronicDiseaseInput,
    ) -> Result<ChronicDisease, ClientError> {
        self.replace(DISEASES, id, input).await
    }

    pub async fn delete_disease(&self, id: Uuid) -> Result<(), ClientError> {
        self.remove(DISEASES, id).await
    }

    // Medications

    pub async fn list_medications(&self) -> Result<Vec<Medication>, ClientError> {
        self.list(MEDICATIONS).await
    }

    pub async fn add_medication(&self, input: &MedicationInput) -> Result<Medication, ClientError> {
        self.add(MEDICATIONS, input).await
    }

    pub async fn update_medication(
        &self,
        id: Uuid,
        input: &MedicationInput,
    ) -> Result<Medication, ClientError> {
        self.replace(MEDICATIONS, id, input).await
    }

    pub async fn delete_medication(&self, id: Uuid) -> Result<(), ClientError> {
        self.remove(MEDICATIONS, id).await
    }

    // Emergency contacts

    pub async fn list_contacts(&self) -> Result<Vec<EmergencyContact>, ClientError> {
        self.list(CONTACTS).await
    }

    pub async fn add_contact(
        &self,
        input: &EmergencyContactInput,
    ) -> Result<EmergencyContact, ClientError> {
        self.add(CONTACTS, input).await
    }

    pub async fn update_contact(
        &self,
        id: Uuid,
        input: &EmergencyContactInput,
    ) -> Result<EmergencyContact, ClientError> {
        self.replace(CONTACTS, id, input).await
    }

    pub async fn delete_contact(&self, id: Uuid) -> Result<(), ClientError> {
        self.remove(CONTACTS, id).await
    }

    // Doctor notes

    pub async fn list_notes(&self) -> Result<Vec<DoctorNote>, ClientError> {
        self.list(NOTES).await
    }

    pub async fn add_note(&self, input: &DoctorNoteInput) -> Result<DoctorNote, ClientError> {
        self.add(NOTES, input).await
    }

    pub async fn update_note(&self, id: Uuid, input: &DoctorNoteUpdate) -> Result<DoctorNote, ClientError> {
        self.replace(NOTES, id, input).await
    }

    pub async fn delete_note(&self, id: Uuid) -> Result<(), ClientError> {
        self.remove(NOTES, id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::client::ApiClient;
    use crate::config::ClientConfig;
    use crate::session::{MemorySessionStore, Session};
    use common::api::AllergyInput;
    use common::types::AllergySeverity;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        let config = ClientConfig::default().with_base_url(&format!("{}/api/v1", server.uri()));
        let store = Arc::new(MemorySessionStore::with_session(Session::new(
            "access-1",
            Some("refresh-1"),
        )));
        ApiClient::new(config, store).unwrap()
    }

    #[tokio::test]
    async fn test_add_allergy_posts_input() {
        let server = MockServer::start().await;
        let profile_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/api/v1/profiles/allergies"))
            .and(header("authorization", "Bearer access-1"))
            .and(body_partial_json(json!({ "allergen": "Penicillin", "severity": "SEVERE" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "allergy_id": Uuid::new_v4(),
                "profile_id": profile_id,
                "allergen": "Penicillin",
                "severity": "SEVERE",
                "reaction": "",
                "notes": "",
                "diagnosed_date": null,
                "created_at": "2026-03-01T08:30:00Z",
                "updated_at": "2026-03-01T08:30:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        let allergy = client
            .profile()
            .add_allergy(&AllergyInput {
                allergen: "Penicillin".to_string(),
                severity: AllergySeverity::Severe,
                reaction: String::new(),
                notes: String::new(),
                diagnosed_date: None,
            })
            .await
            .unwrap();

        assert_eq!(allergy.profile_id, profile_id);
        assert_eq!(allergy.severity, AllergySeverity::Severe);
    }

    #[tokio::test]
    async fn test_delete_contact_uses_item_path() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("DELETE"))
            .and(path(format!("/api/v1/profiles/emergency-contacts/{}", id)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        client.profile().delete_contact(id).await.unwrap();
    }
}
