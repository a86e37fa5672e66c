use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, SchedulingError};

/// Two half-open intervals `[start, end)` overlap iff each starts
/// before the other ends. Abutting slots do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub struct ConflictDetectionService {
    supabase: SupabaseClient,
}

impl ConflictDetectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Find a non-cancelled appointment for the doctor overlapping
    /// `[start, end)`. `exclude_appointment_id` lets a reschedule skip
    /// the appointment being moved.
    ///
    /// The whole predicate runs server-side: doctor scope, status,
    /// half-open overlap against the persisted end time, and the
    /// optional self-exclusion.
    pub async fn check_conflict(
        &self,
        doctor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<i64>,
        auth_token: &str,
    ) -> Result<Option<Appointment>, SchedulingError> {
        debug!(
            "Checking conflicts for doctor {} from {} to {}",
            doctor_id, start, end
        );

        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.cancelled&scheduled_at=lt.{}&scheduled_end_time=gt.{}",
            doctor_id,
            urlencoding::encode(&end.to_rfc3339()),
            urlencoding::encode(&start.to_rfc3339()),
        );
        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }
        path.push_str("&order=scheduled_at.asc&limit=1");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        match result.into_iter().next() {
            Some(row) => {
                let conflicting: Appointment = serde_json::from_value(row)
                    .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;
                warn!(
                    "Conflict detected for doctor {}: appointment {} at {}",
                    doctor_id, conflicting.id, conflicting.scheduled_at
                );
                Ok(Some(conflicting))
            }
            None => Ok(None),
        }
    }
}
