use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, SchedulingError, UpdateAppointmentRequest,
    MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
    conflicts: ConflictDetectionService,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            conflicts: ConflictDetectionService::new(config),
        }
    }

    /// Partial update. A supplied start or duration re-runs the conflict
    /// check with the appointment excluded from its own comparison; a
    /// supplied status is validated against the lifecycle table.
    pub async fn update(
        &self,
        appointment_id: i64,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let existing = self.fetch(appointment_id, auth_token).await?;

        if let Some(duration) = request.duration_minutes {
            if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
                return Err(SchedulingError::InvalidInput(format!(
                    "Duration must be between {} and {} minutes",
                    MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
                )));
            }
        }

        if let Some(next_status) = request.status {
            if !existing.status.can_transition_to(next_status) {
                return Err(SchedulingError::InvalidState(format!(
                    "Cannot change appointment status from {} to {}",
                    existing.status, next_status
                )));
            }
        }

        let mut update_data = serde_json::Map::new();

        let start = request.scheduled_at.unwrap_or(existing.scheduled_at);
        let duration = request.duration_minutes.unwrap_or(existing.duration_minutes);
        let time_changed =
            request.scheduled_at.is_some() || request.duration_minutes.is_some();

        if time_changed {
            let end = Appointment::end_time(start, duration);
            if let Some(conflicting) = self
                .conflicts
                .check_conflict(
                    existing.doctor_id,
                    start,
                    end,
                    Some(appointment_id),
                    auth_token,
                )
                .await?
            {
                return Err(SchedulingError::Conflict(format!(
                    "Doctor already has an appointment at {}",
                    conflicting.scheduled_at.to_rfc3339()
                )));
            }

            update_data.insert("scheduled_at".to_string(), json!(start.to_rfc3339()));
            update_data.insert("duration_minutes".to_string(), json!(duration));
            update_data.insert("scheduled_end_time".to_string(), json!(end.to_rfc3339()));
        }

        if let Some(status) = request.status {
            update_data.insert("status".to_string(), json!(status));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }

        if update_data.is_empty() {
            debug!("No fields to update for appointment {}", appointment_id);
            return Ok(existing);
        }

        let updated = self
            .patch(appointment_id, Value::Object(update_data), auth_token)
            .await?;
        info!("Updated appointment {}", appointment_id);

        Ok(updated)
    }

    /// Cancel keeps the row and its history. The cancellation moment is
    /// appended to the notes rather than replacing them.
    pub async fn cancel(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let existing = self.fetch(appointment_id, auth_token).await?;

        if existing.status == AppointmentStatus::Cancelled {
            return Err(SchedulingError::InvalidState(
                "Appointment is already cancelled".to_string(),
            ));
        }
        if !existing.status.can_transition_to(AppointmentStatus::Cancelled) {
            return Err(SchedulingError::InvalidState(format!(
                "Cannot cancel appointment in status {}",
                existing.status
            )));
        }

        let marker = format!("[CANCELLED at {}]", Utc::now().to_rfc3339());
        let notes = match existing.notes {
            Some(notes) if !notes.is_empty() => format!("{} {}", notes, marker),
            _ => marker,
        };

        let update_data = json!({
            "status": AppointmentStatus::Cancelled,
            "notes": notes,
        });

        let cancelled = self.patch(appointment_id, update_data, auth_token).await?;
        info!("Cancelled appointment {}", appointment_id);

        Ok(cancelled)
    }

    async fn fetch(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;
        serde_json::from_value(row).map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    async fn patch(
        &self,
        appointment_id: i64,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;
        serde_json::from_value(row).map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }
}
