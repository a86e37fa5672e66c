use chrono::NaiveTime;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use directory_cell::services::doctor::DoctorService;
use directory_cell::services::patient::PatientService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, BookAppointmentRequest,
    PatientSelector, SchedulingError, DEFAULT_DURATION_MINUTES, MAX_DURATION_MINUTES,
    MIN_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;

pub struct SchedulingService {
    supabase: SupabaseClient,
    patients: PatientService,
    doctors: DoctorService,
    conflicts: ConflictDetectionService,
}

impl SchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
            doctors: DoctorService::new(config),
            conflicts: ConflictDetectionService::new(config),
        }
    }

    /// Book an appointment for an existing or newly registered patient.
    ///
    /// Patient resolution happens before the conflict check, so a
    /// rejected booking may still have registered a new patient. The
    /// application-level check is the fast path with the useful error
    /// message; the exclusion constraint on the table catches the
    /// check-then-insert race and comes back as a 409.
    pub async fn book(
        &self,
        request: BookAppointmentRequest,
        actor_id: i64,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let selector = request
            .patient_selector()
            .map_err(SchedulingError::InvalidInput)?;

        let duration = request
            .duration_minutes
            .unwrap_or(DEFAULT_DURATION_MINUTES);
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
            return Err(SchedulingError::InvalidInput(format!(
                "Duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            )));
        }

        let patient = match selector {
            PatientSelector::Existing(patient_id) => {
                self.patients.get_patient(patient_id, auth_token).await?
            }
            PatientSelector::New(new_patient) => {
                self.patients.find_or_create(new_patient, auth_token).await?
            }
        };

        let doctor = self.doctors.get_doctor(request.doctor_id, auth_token).await?;

        let end = Appointment::end_time(request.scheduled_at, duration);
        if let Some(conflicting) = self
            .conflicts
            .check_conflict(doctor.id, request.scheduled_at, end, None, auth_token)
            .await?
        {
            return Err(SchedulingError::Conflict(format!(
                "Doctor already has an appointment at {}",
                conflicting.scheduled_at.to_rfc3339()
            )));
        }

        let appointment_data = json!({
            "patient_id": patient.id,
            "doctor_id": doctor.id,
            "scheduled_at": request.scheduled_at.to_rfc3339(),
            "duration_minutes": duration,
            "scheduled_end_time": end.to_rfc3339(),
            "status": AppointmentStatus::Booked,
            "created_by": actor_id,
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
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await?;

        let row = result.into_iter().next().ok_or_else(|| {
            SchedulingError::DatabaseError("Failed to create appointment".to_string())
        })?;

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;
        info!(
            "Booked appointment {} for patient {} with doctor {} at {}",
            appointment.id, appointment.patient_id, appointment.doctor_id,
            appointment.scheduled_at
        );

        Ok(appointment)
    }

    pub async fn get(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result.into_iter().next().ok_or(SchedulingError::NotFound)?;
        serde_json::from_value(row).map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    pub async fn search(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        debug!("Searching appointments: {:?}", query);

        let mut filters = vec![];

        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(date) = query.date {
            // A bare date means the whole day, on the UTC calendar the
            // deployment stores and runs on.
            let day_start = date.and_time(NaiveTime::MIN).and_utc();
            let day_end = date
                .and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap())
                .and_utc();
            filters.push(format!(
                "scheduled_at=gte.{}",
                urlencoding::encode(&day_start.to_rfc3339())
            ));
            filters.push(format!(
                "scheduled_at=lte.{}",
                urlencoding::encode(&day_end.to_rfc3339())
            ));
        }

        let limit = query.limit.unwrap_or(50);
        let offset = query.offset.unwrap_or(0);
        filters.push("order=scheduled_at.asc".to_string());
        filters.push(format!("limit={}&offset={}", limit, offset));

        let path = format!("/rest/v1/appointments?{}", filters.join("&"));
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Hard delete. Bypasses the status machine; the cancel path is the
    /// one that preserves history.
    pub async fn remove(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<(), SchedulingError> {
        // Surfaces NotFound before the unconditional delete.
        self.get(appointment_id, auth_token).await?;

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await?;

        info!("Deleted appointment {}", appointment_id);
        Ok(())
    }
}
