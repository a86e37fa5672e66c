use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DirectoryError, Doctor};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(
        &self,
        doctor_id: i64,
        auth_token: &str,
    ) -> Result<Doctor, DirectoryError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or(DirectoryError::DoctorNotFound)?;

        serde_json::from_value(row).map_err(|e| DirectoryError::DatabaseError(e.to_string()))
    }
}
