use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub org_id: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub org_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        matches!(self.role.as_deref(), Some("admin") | Some("facility_admin"))
    }
}

/// Everything a scheduling call needs to know about who is asking and for
/// which facility. Passed explicitly instead of being read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub facility_id: String,
    pub doctor_id: Option<String>,
    pub org_id: Option<String>,
    pub user_id: String,
    pub auth_token: String,
}

impl SessionContext {
    pub fn new(user: &User, facility_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            facility_id: facility_id.into(),
            doctor_id: None,
            org_id: user.org_id.clone(),
            user_id: user.id.clone(),
            auth_token: auth_token.into(),
        }
    }

    pub fn with_doctor(mut self, doctor_id: Option<String>) -> Self {
        self.doctor_id = doctor_id.filter(|id| !id.trim().is_empty());
        self
    }
}
