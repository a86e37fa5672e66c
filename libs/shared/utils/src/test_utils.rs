use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: 1,
            email: "frontdesk@clinic.example".to_string(),
            role: "frontdesk".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(id: i64, email: &str, role: &str) -> Self {
        Self {
            id,
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn front_desk(id: i64) -> Self {
        Self::new(id, "frontdesk@clinic.example", "frontdesk")
    }

    pub fn admin(id: i64) -> Self {
        Self::new(id, "admin@clinic.example", "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.to_string(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id.to_string(),
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST row payloads for wiremock-backed tests.
pub struct MockClinicRows;

impl MockClinicRows {
    pub fn patient_row(id: i64, name: &str, phone: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "phone": phone,
            "dob": null,
            "notes": null,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn doctor_row(id: i64, name: &str, specialty: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "specialty": specialty,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        id: i64,
        patient_id: i64,
        doctor_id: i64,
        scheduled_at: &str,
        duration_minutes: i32,
        status: &str,
    ) -> serde_json::Value {
        let start = chrono::DateTime::parse_from_rfc3339(scheduled_at)
            .expect("valid RFC3339 timestamp in test fixture");
        let end = start + Duration::minutes(duration_minutes as i64);
        json!({
            "id": id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_at": start.to_rfc3339(),
            "duration_minutes": duration_minutes,
            "scheduled_end_time": end.to_rfc3339(),
            "status": status,
            "created_by": 1,
            "notes": null,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn queue_entry_row(
        id: i64,
        patient_id: i64,
        queue_number: i32,
        priority: i32,
        status: &str,
        created_at: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "queue_number": queue_number,
            "priority": priority,
            "status": status,
            "notes": null,
            "created_at": created_at,
            "updated_at": created_at
        })
    }
}
