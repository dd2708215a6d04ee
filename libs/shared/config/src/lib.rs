use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub calendar_service_url: String,
    pub calendar_service_api_key: String,
    pub auth_jwt_secret: String,
    pub request_timeout_secs: u64,
    pub projection_cache_ttl_secs: u64,
    pub api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            calendar_service_url: env::var("CALENDAR_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_SERVICE_URL not set, falling back to in-memory calendar");
                    String::new()
                }),
            calendar_service_api_key: env::var("CALENDAR_SERVICE_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_SERVICE_API_KEY not set, using empty value");
                    String::new()
                }),
            auth_jwt_secret: env::var("AUTH_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("AUTH_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            request_timeout_secs: parse_or_default("CALENDAR_REQUEST_TIMEOUT_SECS", 15),
            projection_cache_ttl_secs: parse_or_default("CALENDAR_PROJECTION_CACHE_TTL_SECS", 60),
            api_port: parse_or_default("API_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.auth_jwt_secret.is_empty() && self.is_calendar_service_configured()
    }

    pub fn is_calendar_service_configured(&self) -> bool {
        !self.calendar_service_url.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            calendar_service_url: String::new(),
            calendar_service_api_key: String::new(),
            auth_jwt_secret: String::new(),
            request_timeout_secs: 15,
            projection_cache_ttl_secs: 60,
            api_port: 3000,
        }
    }
}

fn parse_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
