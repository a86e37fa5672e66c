use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{CreatePatientRequest, DirectoryError, Patient};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create a patient, or return the existing record when the phone
    /// number is already on file. Phone is the dedup key for walk-ins
    /// who cannot remember whether they registered before.
    pub async fn find_or_create(
        &self,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, DirectoryError> {
        request
            .validate()
            .map_err(DirectoryError::ValidationError)?;

        debug!("Resolving patient by phone: {}", request.phone);

        let path = format!(
            "/rest/v1/patients?phone=eq.{}&limit=1",
            urlencoding::encode(&request.phone)
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        if let Some(row) = existing.into_iter().next() {
            let patient: Patient = serde_json::from_value(row)
                .map_err(|e| DirectoryError::DatabaseError(e.to_string()))?;
            debug!("Reusing existing patient {} for phone match", patient.id);
            return Ok(patient);
        }

        let patient_data = json!({
            "name": request.name,
            "phone": request.phone,
            "dob": request.dob,
            "notes": request.notes,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/patients",
                Some(auth_token),
                Some(patient_data),
                Some(headers),
            )
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::DatabaseError("Failed to create patient".to_string()))?;

        let patient: Patient = serde_json::from_value(row)
            .map_err(|e| DirectoryError::DatabaseError(e.to_string()))?;
        debug!("Created patient {}", patient.id);

        Ok(patient)
    }

    pub async fn get_patient(
        &self,
        patient_id: i64,
        auth_token: &str,
    ) -> Result<Patient, DirectoryError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or(DirectoryError::PatientNotFound)?;

        serde_json::from_value(row).map_err(|e| DirectoryError::DatabaseError(e.to_string()))
    }
}
