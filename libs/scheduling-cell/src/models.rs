use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use directory_cell::models::CreatePatientRequest;

pub const MIN_DURATION_MINUTES: i32 = 15;
pub const MAX_DURATION_MINUTES: i32 = 240;
pub const DEFAULT_DURATION_MINUTES: i32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    /// Persisted alongside the start so overlap queries stay a pure
    /// filter expression on the REST interface.
    pub scheduled_end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_by: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(scheduled_at: DateTime<Utc>, duration_minutes: i32) -> DateTime<Utc> {
        scheduled_at + Duration::minutes(duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Booked appointments may complete or cancel. Completed and
    /// cancelled are terminal.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (
                AppointmentStatus::Booked,
                AppointmentStatus::Completed | AppointmentStatus::Cancelled
            )
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "booked"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Who the booking is for: an already-registered patient, or a new
/// registration captured at the desk in the same request.
#[derive(Debug, Clone)]
pub enum PatientSelector {
    Existing(i64),
    New(CreatePatientRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Option<i64>,
    pub new_patient: Option<CreatePatientRequest>,
    pub doctor_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

impl BookAppointmentRequest {
    /// Exactly one of `patient_id` / `new_patient` must be present.
    pub fn patient_selector(&self) -> Result<PatientSelector, String> {
        match (self.patient_id, &self.new_patient) {
            (Some(id), None) => Ok(PatientSelector::Existing(id)),
            (None, Some(new_patient)) => Ok(PatientSelector::New(new_patient.clone())),
            (Some(_), Some(_)) => {
                Err("Provide either patient_id or new_patient, not both".to_string())
            }
            (None, None) => Err("Either patient_id or new_patient is required".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentSearchQuery {
    pub doctor_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub doctor_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub exclude_appointment_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointment: Option<Appointment>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidState(String),

    /// Doctor double-booking. The message carries the conflicting start
    /// time so the desk can offer the caller a concrete reason.
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::supabase::DbError> for SchedulingError {
    fn from(err: shared_database::supabase::DbError) -> Self {
        match err {
            shared_database::supabase::DbError::Conflict(msg) => SchedulingError::Conflict(msg),
            other => SchedulingError::DatabaseError(other.to_string()),
        }
    }
}

impl From<directory_cell::models::DirectoryError> for SchedulingError {
    fn from(err: directory_cell::models::DirectoryError) -> Self {
        use directory_cell::models::DirectoryError;
        match err {
            DirectoryError::PatientNotFound => SchedulingError::PatientNotFound,
            DirectoryError::DoctorNotFound => SchedulingError::DoctorNotFound,
            DirectoryError::ValidationError(msg) => SchedulingError::InvalidInput(msg),
            DirectoryError::DatabaseError(msg) => SchedulingError::DatabaseError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_patient() -> CreatePatientRequest {
        CreatePatientRequest {
            name: "Jane Doe".to_string(),
            phone: "+353851234567".to_string(),
            dob: None,
            notes: None,
        }
    }

    fn request(patient_id: Option<i64>, new_patient: Option<CreatePatientRequest>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id,
            new_patient,
            doctor_id: 1,
            scheduled_at: Utc::now(),
            duration_minutes: None,
            notes: None,
        }
    }

    #[test]
    fn selector_requires_exactly_one_variant() {
        assert!(matches!(
            request(Some(5), None).patient_selector(),
            Ok(PatientSelector::Existing(5))
        ));
        assert!(matches!(
            request(None, Some(new_patient())).patient_selector(),
            Ok(PatientSelector::New(_))
        ));
        assert!(request(Some(5), Some(new_patient())).patient_selector().is_err());
        assert!(request(None, None).patient_selector().is_err());
    }

    #[test]
    fn booked_transitions_to_both_terminals() {
        assert!(AppointmentStatus::Booked.can_transition_to(AppointmentStatus::Completed));
        assert!(AppointmentStatus::Booked.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!AppointmentStatus::Booked.can_transition_to(AppointmentStatus::Booked));
    }

    #[test]
    fn terminal_statuses_admit_no_transitions() {
        for terminal in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                AppointmentStatus::Booked,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
