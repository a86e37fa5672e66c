use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub iat: Option<u64>,
}

/// Authenticated front-desk user attached to the request extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Staff users carry their integer database id in the JWT subject.
    pub fn staff_id(&self) -> Option<i64> {
        self.id.parse::<i64>().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    pub fn is_front_desk(&self) -> bool {
        matches!(self.role.as_deref(), Some("frontdesk") | Some("admin"))
    }
}
