use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub calendar_service_url: String,
    pub calendar_service_api_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            calendar_service_url: String::new(),
            calendar_service_api_key: "test-api-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_calendar_service(url: &str) -> Self {
        Self {
            calendar_service_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            calendar_service_url: self.calendar_service_url.clone(),
            calendar_service_api_key: self.calendar_service_api_key.clone(),
            auth_jwt_secret: self.jwt_secret.clone(),
            request_timeout_secs: 5,
            projection_cache_ttl_secs: 60,
            api_port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub org_id: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("staff@aptcarepet.test", "staff")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            org_id: "org-test".to_string(),
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            org_id: Some(self.org_id.clone()),
            metadata: None,
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
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "org_id": user.org_id,
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

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned calendar service payloads in the backend's wire shape.
pub struct MockCalendarResponses;

impl MockCalendarResponses {
    pub fn status_response(status: &str, message: &str) -> serde_json::Value {
        json!({
            "status": status,
            "message": message
        })
    }

    pub fn slot_days_response(available: &str, partial: &str, full: &str) -> serde_json::Value {
        json!({
            "available_dates": available,
            "partial_dates": partial,
            "booked_dates": full
        })
    }

    pub fn booking_response(appointment_id: &str, patient_id: &str, start: &str, end: &str) -> serde_json::Value {
        json!({
            "appointment_id": appointment_id,
            "patient_id": patient_id,
            "patient_name": "Biscuit",
            "start_time": start,
            "stop_time": end,
            "status": "booked"
        })
    }

    /// Monday and Wednesday 09:00-11:00, 30 minute slots, January 2025.
    pub fn flat_slot_record(slot_id: &str, facility_id: &str) -> serde_json::Value {
        json!({
            "slot_id": slot_id,
            "facility_id": facility_id,
            "doctor_id": null,
            "from_date": "01/01/2025",
            "to_date": "31/01/2025",
            "booking_type": "timeslot",
            "slot_duration": 30,
            "capacity": null,
            "version": 3,
            "mon_start_1": "09:00",
            "mon_stop_1": "11:00",
            "mon_start_2": "0",
            "mon_stop_2": "0",
            "mon_available": true,
            "tue_start_1": "00:00",
            "tue_stop_1": "00:00",
            "tue_available": false,
            "wed_start_1": "09:00",
            "wed_stop_1": "11:00",
            "wed_available": true
        })
    }
}
