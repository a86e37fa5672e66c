use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use directory_cell::models::CreatePatientRequest;

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 10;
pub const DEFAULT_PRIORITY: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub patient_id: i64,
    /// Globally unique ticket number. Strictly increasing, never reused,
    /// no daily reset.
    pub queue_number: i32,
    pub priority: i32,
    pub status: QueueStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    WithDoctor,
    Completed,
    Skipped,
}

impl QueueStatus {
    /// Waiting entries may be called in, skipped, or completed outright.
    /// An entry with the doctor can only complete. Completed and skipped
    /// are terminal.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (
                QueueStatus::Waiting,
                QueueStatus::WithDoctor | QueueStatus::Skipped | QueueStatus::Completed
            ) | (QueueStatus::WithDoctor, QueueStatus::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Skipped)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Waiting => write!(f, "waiting"),
            QueueStatus::WithDoctor => write!(f, "with_doctor"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Who joins the queue: a registered patient or a walk-in registered at
/// the desk in the same request.
#[derive(Debug, Clone)]
pub enum PatientSelector {
    Existing(i64),
    New(CreatePatientRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddToQueueRequest {
    pub patient_id: Option<i64>,
    pub new_patient: Option<CreatePatientRequest>,
    pub priority: Option<i32>,
    pub notes: Option<String>,
}

impl AddToQueueRequest {
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
pub struct UpdateQueueStatusRequest {
    pub status: QueueStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueListQuery {
    pub status: Option<QueueStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub with_doctor: i64,
    pub total_today: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue entry not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::supabase::DbError> for QueueError {
    fn from(err: shared_database::supabase::DbError) -> Self {
        QueueError::DatabaseError(err.to_string())
    }
}

impl From<directory_cell::models::DirectoryError> for QueueError {
    fn from(err: directory_cell::models::DirectoryError) -> Self {
        use directory_cell::models::DirectoryError;
        match err {
            DirectoryError::PatientNotFound => QueueError::PatientNotFound,
            DirectoryError::DoctorNotFound => QueueError::NotFound,
            DirectoryError::ValidationError(msg) => QueueError::InvalidInput(msg),
            DirectoryError::DatabaseError(msg) => QueueError::DatabaseError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_fans_out_to_three_states() {
        assert!(QueueStatus::Waiting.can_transition_to(QueueStatus::WithDoctor));
        assert!(QueueStatus::Waiting.can_transition_to(QueueStatus::Skipped));
        assert!(QueueStatus::Waiting.can_transition_to(QueueStatus::Completed));
        assert!(!QueueStatus::Waiting.can_transition_to(QueueStatus::Waiting));
    }

    #[test]
    fn with_doctor_only_completes() {
        assert!(QueueStatus::WithDoctor.can_transition_to(QueueStatus::Completed));
        assert!(!QueueStatus::WithDoctor.can_transition_to(QueueStatus::Skipped));
        assert!(!QueueStatus::WithDoctor.can_transition_to(QueueStatus::Waiting));
        assert!(!QueueStatus::WithDoctor.can_transition_to(QueueStatus::WithDoctor));
    }

    #[test]
    fn terminal_statuses_admit_no_transitions() {
        for terminal in [QueueStatus::Completed, QueueStatus::Skipped] {
            assert!(terminal.is_terminal());
            for next in [
                QueueStatus::Waiting,
                QueueStatus::WithDoctor,
                QueueStatus::Completed,
                QueueStatus::Skipped,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn selector_requires_exactly_one_variant() {
        let base = AddToQueueRequest {
            patient_id: Some(3),
            new_patient: None,
            priority: None,
            notes: None,
        };
        assert!(matches!(
            base.patient_selector(),
            Ok(PatientSelector::Existing(3))
        ));

        let neither = AddToQueueRequest {
            patient_id: None,
            new_patient: None,
            priority: None,
            notes: None,
        };
        assert!(neither.patient_selector().is_err());
    }
}
