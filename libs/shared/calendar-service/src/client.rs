use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Calendar service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Calendar service error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected calendar service payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid calendar service URL: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// JSON client for the remote calendar service.
pub struct CalendarServiceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CalendarServiceClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build calendar HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.calendar_service_url.trim_end_matches('/').to_string(),
            api_key: config.calendar_service_api_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Bearer token contains invalid header characters, sending without it"),
            }
        }

        headers
    }

    /// Base URL extended by `segments`, each escaped as a single path
    /// segment.
    fn url_for(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
    {
        let url = self.url_for(segments)?;
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, url)
            .headers(self.get_headers(auth_token));

        if !query.is_empty() {
            req = req.query(query);
        }

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Calendar service error ({}): {}", status, error_text);

            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let bytes = response.bytes().await?;
        // DELETE endpoints may answer with an empty body
        let data = if bytes.is_empty() {
            serde_json::from_value(Value::Null)?
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(data)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
