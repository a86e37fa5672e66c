use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub dob: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub specialty: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub name: String,
    pub phone: String,
    pub dob: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl CreatePatientRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Patient name is required".to_string());
        }
        if self.name.len() > 100 {
            return Err("Patient name must be at most 100 characters".to_string());
        }
        if self.phone.trim().is_empty() {
            return Err("Patient phone is required".to_string());
        }
        if self.phone.len() > 20 {
            return Err("Patient phone must be at most 20 characters".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::supabase::DbError> for DirectoryError {
    fn from(err: shared_database::supabase::DbError) -> Self {
        DirectoryError::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, phone: &str) -> CreatePatientRequest {
        CreatePatientRequest {
            name: name.to_string(),
            phone: phone.to_string(),
            dob: None,
            notes: None,
        }
    }

    #[test]
    fn accepts_well_formed_patient() {
        assert!(request("Jane Doe", "+353851234567").validate().is_ok());
    }

    #[test]
    fn rejects_blank_name_and_phone() {
        assert!(request("  ", "+353851234567").validate().is_err());
        assert!(request("Jane Doe", "").validate().is_err());
    }

    #[test]
    fn rejects_overlong_fields() {
        assert!(request(&"x".repeat(101), "+353851234567").validate().is_err());
        assert!(request("Jane Doe", &"1".repeat(21)).validate().is_err());
    }
}
