use crate::config::DigitalHumanConfig;
use crate::profile::ProfileRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Preprocess request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Preprocess service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Payload accepted by the digital human preprocessing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessRequest {
    pub user_id: String,
    pub request_id: String,
    pub streamer_id: String,
    pub video_path: String,
}

impl PreprocessRequest {
    /// Build the request for a record whose base video lives under `video_dir`
    ///
    /// The stored path is a server URL path; only its file name is kept and
    /// resolved against the local directory.
    pub fn for_record(user_id: &str, video_dir: &Path, record: &ProfileRecord) -> Self {
        let file_name = Path::new(&record.base_video_path)
            .file_name()
            .unwrap_or_default();

        Self {
            user_id: user_id.to_string(),
            request_id: Uuid::new_v4().to_string(),
            streamer_id: record.id.to_string(),
            video_path: video_dir.join(file_name).to_string_lossy().into_owned(),
        }
    }
}

/// Something that can kick off digital human preprocessing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreprocessNotifier: Send + Sync {
    async fn notify(&self, request: &PreprocessRequest) -> Result<(), PreprocessError>;
}

/// HTTP client for the digital human preprocessing endpoint
pub struct DigitalHumanClient {
    client: Client,
    endpoint: String,
}

impl DigitalHumanClient {
    pub fn new(config: &DigitalHumanConfig) -> Result<Self, PreprocessError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(PreprocessError::Client)?;

        info!(endpoint = %config.preprocess_url, "Digital human client initialized");

        Ok(Self {
            client,
            endpoint: config.preprocess_url.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PreprocessNotifier for DigitalHumanClient {
    #[instrument(skip(self, request), fields(streamer_id = %request.streamer_id, request_id = %request.request_id))]
    async fn notify(&self, request: &PreprocessRequest) -> Result<(), PreprocessError> {
        debug!(video_path = %request.video_path, "Sending digital human preprocess request");

        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PreprocessError::Status { status, body });
        }

        debug!(%status, "Preprocess request accepted");
        Ok(())
    }
}
