use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_OAUTH_BASE: &str = "https://www.strava.com/oauth";
pub const ACTIVITY_URL: &str = "https://www.strava.com/activities";
pub const UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No access token set")]
    MissingToken,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("Failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("upload {upload_id} still processing after {attempts} status checks")]
    PollLimit { upload_id: u64, attempts: u32 },
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryActivity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub start_date: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub elapsed_time: u32,
    #[serde(default)]
    pub gear_id: Option<String>,
    #[serde(default)]
    pub workout_type: Option<u32>,
    #[serde(default)]
    pub commute: bool,
    #[serde(default)]
    pub trainer: bool,
    #[serde(default)]
    pub private: bool,
}

/// Query for one page of the athlete's activities. `before`/`after` are epoch seconds.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
}

/// Form body for creating a manual activity.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewActivity {
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub start_date_local: String,
    pub elapsed_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainer: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commute: Option<u8>,
}

/// JSON body for updating an existing activity. Only mutable fields are sent;
/// `description` is left out unless it was edited.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityUpdate {
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub commute: bool,
    pub trainer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gear_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreatedActivity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// A data file plus the metadata sent alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub data_type: String,
    pub activity_type: String,
    pub name: String,
    pub description: String,
    pub external_id: String,
    pub commute: bool,
    pub trainer: bool,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Upload {
    pub id: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub activity_id: Option<u64>,
}

impl Upload {
    /// The processing error reported by the service, if any.
    pub fn failure(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// The created activity, once processing has finished.
    pub fn activity(&self) -> Option<u64> {
        self.activity_id.filter(|id| *id != 0)
    }
}

// OAuth types
#[derive(Serialize)]
pub struct OAuthTokenRequest {
    pub grant_type: String, // "authorization_code"
    pub code: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub athlete: Option<AthleteSummary>,
}

#[derive(Deserialize)]
pub struct AthleteSummary {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// The remote operations the batch commands depend on.
#[allow(async_fn_in_trait)]
pub trait ActivityApi {
    async fn list_activities(&self, query: &ListQuery) -> Result<Vec<SummaryActivity>, ApiError>;
    async fn create_activity(&self, activity: &NewActivity) -> Result<CreatedActivity, ApiError>;
    async fn update_activity(
        &self,
        id: u64,
        update: &ActivityUpdate,
    ) -> Result<CreatedActivity, ApiError>;
    async fn create_upload(&self, upload: NewUpload) -> Result<Upload, ApiError>;
    async fn get_upload(&self, upload_id: u64) -> Result<Upload, ApiError>;
}

/// How `await_upload` waits for asynchronous processing.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the service reports a terminal state.
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: UPLOAD_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

/// Polls an upload until it either produced an activity or reported an error.
pub async fn await_upload<A: ActivityApi>(
    api: &A,
    mut upload: Upload,
    policy: PollPolicy,
) -> Result<u64, ApiError> {
    let mut polls = 0;
    loop {
        if let Some(reason) = upload.failure() {
            return Err(ApiError::UploadFailed(reason.to_string()));
        }
        if let Some(activity_id) = upload.activity() {
            return Ok(activity_id);
        }
        if policy.max_polls.is_some_and(|max| polls >= max) {
            return Err(ApiError::PollLimit {
                upload_id: upload.id,
                attempts: polls,
            });
        }

        tokio::time::sleep(policy.interval).await;
        polls += 1;
        debug!(upload_id = upload.id, status = ?upload.status, "checking on upload status");
        upload = api.get_upload(upload.id).await?;
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub oauth_base: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            oauth_base: DEFAULT_OAUTH_BASE.to_string(),
        }
    }
}

pub struct StravaClient {
    client: Client,
    config: ClientConfig,
    auth_header: Option<String>,
}

impl Default for StravaClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl StravaClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            auth_header: None,
        }
    }

    pub fn set_access_token(&mut self, access_token: &str) {
        self.auth_header = Some(format!("Bearer {access_token}"));
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let auth_header = self.auth_header.as_ref().ok_or(ApiError::MissingToken)?;
        Ok(request.header("Authorization", auth_header))
    }

    /// Sends a request and decodes a JSON body. A non-success status is
    /// returned together with whatever error payload the service sent.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .inspect_err(|e| debug!("{operation} request failed: {e}"))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!("{operation} returned {status}: {body}");
            return Err(ApiError::Http { status, body });
        }

        debug!("{operation} succeeded with {status}");
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn exchange_oauth_code(
        &self,
        request: &OAuthTokenRequest,
    ) -> Result<OAuthTokenResponse, ApiError> {
        let path = format!("{}/token", self.config.oauth_base);
        self.send_json(self.client.post(path).form(request), "OAuth token exchange")
            .await
    }
}

impl ActivityApi for StravaClient {
    async fn list_activities(&self, query: &ListQuery) -> Result<Vec<SummaryActivity>, ApiError> {
        let path = format!("{}/athlete/activities", self.config.api_base);
        let request = self.authorized(self.client.get(path).query(query))?;
        self.send_json(request, "list activities").await
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<CreatedActivity, ApiError> {
        let path = format!("{}/activities", self.config.api_base);
        let request = self.authorized(self.client.post(path).form(activity))?;
        self.send_json(request, "create activity").await
    }

    async fn update_activity(
        &self,
        id: u64,
        update: &ActivityUpdate,
    ) -> Result<CreatedActivity, ApiError> {
        let path = format!("{}/activities/{id}", self.config.api_base);
        let request = self.authorized(self.client.put(path).json(update))?;
        self.send_json(request, "update activity").await
    }

    async fn create_upload(&self, upload: NewUpload) -> Result<Upload, ApiError> {
        let path = format!("{}/uploads", self.config.api_base);

        let file = Part::bytes(upload.data).file_name(upload.file_name);
        let mut form = Form::new()
            .part("file", file)
            .text("data_type", upload.data_type)
            .text("activity_type", upload.activity_type)
            .text("name", upload.name);
        if !upload.description.is_empty() {
            form = form.text("description", upload.description);
        }
        if !upload.external_id.is_empty() {
            form = form.text("external_id", upload.external_id);
        }
        if upload.trainer {
            form = form.text("trainer", "1");
        }
        if upload.commute {
            form = form.text("commute", "1");
        }

        let request = self.authorized(self.client.post(path).multipart(form))?;
        self.send_json(request, "create upload").await
    }

    async fn get_upload(&self, upload_id: u64) -> Result<Upload, ApiError> {
        let path = format!("{}/uploads/{upload_id}", self.config.api_base);
        let request = self.authorized(self.client.get(path))?;
        self.send_json(request, "get upload").await
    }
}
