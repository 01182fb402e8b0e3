//! SessionClient - talks to the remote photo-booth session API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::retry::{with_network_retry, RetryPolicy};

/// Environment variable holding the optional API key.
pub const API_KEY_ENV: &str = "PHOTOBOOTH_API_KEY";

/// Default base URL for the session API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Default timeout for ordinary API calls (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the photo upload (60 seconds). Encoding a full photo is slow on
/// kiosk hardware, so this is longer than [`DEFAULT_TIMEOUT`].
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// An AI visual theme offered by the booth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

/// A booth session as reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub theme_id: Option<String>,
    /// Transformed image, once the AI stage is done
    #[serde(default)]
    pub result_image_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    theme_id: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateImageRequest {
    image: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreprocessRequest<'a> {
    session_id: &'a str,
}

/// Error body shape used by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Errors that can occur talking to the session API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {message} (after {attempts} attempts)")]
    NetworkError {
        /// Last transport error message
        message: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    #[error("Invalid session id '{0}'")]
    InvalidSessionId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_send_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Http(error)
    }
}

/// Ids are interpolated into URL paths, so they must be a single segment.
fn validate_session_id(session_id: &str) -> Result<(), ApiError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed != session_id {
        return Err(ApiError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

/// Pull a human-readable message out of an error response body.
pub fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ if body.trim().is_empty() => "Unknown error".to_string(),
        _ => body.trim().to_string(),
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

/// The calls the orchestrator makes against the remote session API.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// PATCH the session with a base64 JPEG data URL, bounded by `timeout`.
    async fn update_session_image(
        &self,
        session_id: &str,
        data_url: String,
        timeout: Duration,
    ) -> Result<(), ApiError>;

    /// Ask the backend to start preprocessing the uploaded photo.
    async fn preprocess_image(&self, session_id: &str) -> Result<(), ApiError>;
}

/// reqwest-backed client for the session API.
#[derive(Debug, Clone)]
pub struct SessionClient {
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl SessionClient {
    /// Create a client for `base_url`, reading the API key from
    /// `PHOTOBOOTH_API_KEY` if it is set.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit key and default request timeout.
    pub fn with_api_key(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit key and request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    /// Replace the retry policy used for reads.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .authorize(self.http_client.get(url))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = error_for_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let url = url.as_str();
        with_network_retry(self.retry, move || self.get_json_once::<T>(url)).await
    }

    /// List the themes the booth can apply.
    pub async fn list_themes(&self) -> Result<Vec<Theme>, ApiError> {
        self.get_json("themes").await
    }

    /// Fetch the current state of a session.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, ApiError> {
        validate_session_id(session_id)?;
        self.get_json(&format!("sessions/{}", session_id)).await
    }

    /// Start a new session for a theme.
    pub async fn create_session(&self, theme_id: &str) -> Result<Session, ApiError> {
        let response = self
            .authorize(self.http_client.post(self.url("sessions")))
            .json(&CreateSessionRequest { theme_id })
            .send()
            .await
            .map_err(map_send_error)?;
        let response = error_for_status(response).await?;
        let session: Session = response.json().await?;
        log::info!("Created session {} for theme {}", session.id, theme_id);
        Ok(session)
    }

    /// Stream a result image to disk without holding it in memory.
    pub async fn download_image(&self, url: &str, dest: &Path) -> Result<PathBuf, ApiError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = error_for_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl SessionApi for SessionClient {
    async fn update_session_image(
        &self,
        session_id: &str,
        data_url: String,
        timeout: Duration,
    ) -> Result<(), ApiError> {
        validate_session_id(session_id)?;
        let payload_len = data_url.len();

        let response = self
            .authorize(self.http_client.patch(self.url(&format!("sessions/{}", session_id))))
            .timeout(timeout)
            .json(&UpdateImageRequest { image: data_url })
            .send()
            .await
            .map_err(map_send_error)?;
        error_for_status(response).await?;

        log::info!(
            "Uploaded {} byte payload to session {}",
            payload_len,
            session_id
        );
        Ok(())
    }

    async fn preprocess_image(&self, session_id: &str) -> Result<(), ApiError> {
        validate_session_id(session_id)?;
        let response = self
            .authorize(self.http_client.post(self.url("preprocess-image")))
            .json(&PreprocessRequest { session_id })
            .send()
            .await
            .map_err(map_send_error)?;
        error_for_status(response).await?;
        Ok(())
    }
}
