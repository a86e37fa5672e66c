use chrono::{Duration, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use directory_cell::services::patient::PatientService;
use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    AddToQueueRequest, PatientSelector, QueueEntry, QueueError, QueueStats, QueueStatus,
    UpdateQueueStatusRequest, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};

pub struct QueueService {
    supabase: SupabaseClient,
    patients: PatientService,
}

impl QueueService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
        }
    }

    /// Admit a walk-in. The ticket number comes from the
    /// `next_queue_number()` database function so concurrent admissions
    /// never hand out the same number; the partial unique index on
    /// waiting patients backstops the duplicate check below.
    pub async fn admit(
        &self,
        request: AddToQueueRequest,
        auth_token: &str,
    ) -> Result<QueueEntry, QueueError> {
        let selector = request
            .patient_selector()
            .map_err(QueueError::InvalidInput)?;

        let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(QueueError::InvalidInput(format!(
                "Priority must be between {} and {}",
                MIN_PRIORITY, MAX_PRIORITY
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

        let path = format!(
            "/rest/v1/queue_entries?patient_id=eq.{}&status=eq.waiting&limit=1",
            patient.id
        );
        let waiting: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        if !waiting.is_empty() {
            return Err(QueueError::InvalidState(
                "Patient is already in the waiting queue".to_string(),
            ));
        }

        let queue_number: i32 = self
            .supabase
            .rpc("next_queue_number", Some(auth_token), json!({}))
            .await?;

        let entry_data = json!({
            "patient_id": patient.id,
            "queue_number": queue_number,
            "priority": priority,
            "status": QueueStatus::Waiting,
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
                "/rest/v1/queue_entries",
                Some(auth_token),
                Some(entry_data),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                // Lost the race against another admission of the same
                // patient; the partial unique index rejected the insert.
                DbError::Conflict(_) => QueueError::InvalidState(
                    "Patient is already in the waiting queue".to_string(),
                ),
                other => QueueError::from(other),
            })?;

        let row = result.into_iter().next().ok_or_else(|| {
            QueueError::DatabaseError("Failed to create queue entry".to_string())
        })?;

        let entry: QueueEntry = serde_json::from_value(row)
            .map_err(|e| QueueError::DatabaseError(e.to_string()))?;
        info!(
            "Admitted patient {} to queue as number {} (priority {})",
            entry.patient_id, entry.queue_number, entry.priority
        );

        Ok(entry)
    }

    /// Queue order is the calling order: highest priority first, oldest
    /// first within a priority.
    pub async fn list(
        &self,
        status: Option<QueueStatus>,
        auth_token: &str,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        debug!("Listing queue entries (status filter: {:?})", status);

        let mut path = "/rest/v1/queue_entries?".to_string();
        if let Some(status) = status {
            path.push_str(&format!("status=eq.{}&", status));
        }
        path.push_str("order=priority.desc,created_at.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| QueueError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    pub async fn get(&self, entry_id: i64, auth_token: &str) -> Result<QueueEntry, QueueError> {
        debug!("Fetching queue entry: {}", entry_id);

        let path = format!("/rest/v1/queue_entries?id=eq.{}", entry_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result.into_iter().next().ok_or(QueueError::NotFound)?;
        serde_json::from_value(row).map_err(|e| QueueError::DatabaseError(e.to_string()))
    }

    pub async fn update_status(
        &self,
        entry_id: i64,
        request: UpdateQueueStatusRequest,
        auth_token: &str,
    ) -> Result<QueueEntry, QueueError> {
        let existing = self.get(entry_id, auth_token).await?;

        if existing.status.is_terminal() {
            return Err(QueueError::InvalidState(
                "Cannot update status of completed or skipped entry".to_string(),
            ));
        }
        if !existing.status.can_transition_to(request.status) {
            return Err(QueueError::InvalidState(format!(
                "Cannot change queue status from {} to {}",
                existing.status, request.status
            )));
        }

        let update_data = json!({
            "status": request.status,
            "notes": request.notes.or(existing.notes),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/queue_entries?id=eq.{}", entry_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await?;

        let row = result.into_iter().next().ok_or(QueueError::NotFound)?;
        let entry: QueueEntry = serde_json::from_value(row)
            .map_err(|e| QueueError::DatabaseError(e.to_string()))?;
        info!(
            "Queue entry {} moved to status {}",
            entry.id, entry.status
        );

        Ok(entry)
    }

    /// Skip stamps the moment into the notes so the desk can see when
    /// the patient was called and missed.
    pub async fn skip(&self, entry_id: i64, auth_token: &str) -> Result<QueueEntry, QueueError> {
        let request = UpdateQueueStatusRequest {
            status: QueueStatus::Skipped,
            notes: Some(format!("Skipped at {}", Utc::now().to_rfc3339())),
        };
        self.update_status(entry_id, request, auth_token).await
    }

    /// Hard delete. No terminal restriction; removal is the correction
    /// path for entries created by mistake.
    pub async fn remove(&self, entry_id: i64, auth_token: &str) -> Result<(), QueueError> {
        self.get(entry_id, auth_token).await?;

        let path = format!("/rest/v1/queue_entries?id=eq.{}", entry_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await?;

        info!("Deleted queue entry {}", entry_id);
        Ok(())
    }

    /// Day totals are computed on the UTC calendar day; the deployment
    /// stores all timestamps in UTC and runs the clinic clock on it.
    pub async fn stats(&self, auth_token: &str) -> Result<QueueStats, QueueError> {
        debug!("Computing queue stats");

        let waiting = self
            .count(&format!("status=eq.{}", QueueStatus::Waiting), auth_token)
            .await?;
        let with_doctor = self
            .count(&format!("status=eq.{}", QueueStatus::WithDoctor), auth_token)
            .await?;

        let day_start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);
        let total_today = self
            .count(
                &format!(
                    "created_at=gte.{}&created_at=lt.{}",
                    urlencoding::encode(&day_start.to_rfc3339()),
                    urlencoding::encode(&day_end.to_rfc3339())
                ),
                auth_token,
            )
            .await?;

        Ok(QueueStats {
            waiting,
            with_doctor,
            total_today,
        })
    }

    async fn count(&self, filter: &str, auth_token: &str) -> Result<i64, QueueError> {
        let path = format!("/rest/v1/queue_entries?{}", filter);
        Ok(self.supabase.count(&path, Some(auth_token)).await?)
    }
}
