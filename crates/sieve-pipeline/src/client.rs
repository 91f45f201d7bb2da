//! Classification client for the remote NSFW endpoint.
//!
//! ## Architecture
//!
//! ```text
//! classify(path) → RateGovernor.acquire() → read file → RetryPolicy.run(
//!                                                         Transport.send_once)
//! ```
//!
//! [`Transport`] is a single request with no retry logic. [`HttpTransport`]
//! implements it over a pooled `reqwest::Client`; tests substitute their own.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use sieve_core::Prediction;

use crate::config::PipelineConfig;
use crate::error::{AttemptError, ClientError, ClientErrorKind, ConfigError};
use crate::governor::RateGovernor;
use crate::retry::RetryPolicy;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 200;

/// An image ready to upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Reads the file and infers its MIME type from the extension.
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            file_name,
            mime_type: mime_for(path),
            bytes,
        })
    }
}

/// MIME type for a path, `application/octet-stream` if the extension is unknown.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// A single classify request with no retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_once(&self, upload: &ImageUpload) -> Result<Prediction, AttemptError>;
}

/// [`Transport`] over HTTP multipart.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Builds a pooled client with the configured timeout.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Sieve/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.client.timeout())
            .pool_max_idle_per_host(config.client.pool_max_idle_per_host)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self::with_client(client, config.classify_url()))
    }

    /// Uses an existing client and full endpoint URL.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

fn request_error(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Timeout
    } else if e.is_decode() {
        AttemptError::Decode(e.to_string())
    } else {
        AttemptError::Transport(e.to_string())
    }
}

/// Extracts `{"error": "...", "message": "..."}` from an error body, else a
/// truncated body.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        match (field("error"), field("message")) {
            (Some(error), Some(detail)) if error != detail => {
                return format!("{error}: {detail}");
            }
            (Some(error), _) => return error.to_string(),
            (None, Some(detail)) => return detail.to_string(),
            (None, None) => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_once(&self, upload: &ImageUpload) -> Result<Prediction, AttemptError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        serde_json::from_slice(&body).map_err(|e| AttemptError::Decode(e.to_string()))
    }
}

/// Rate-governed, retrying classifier client.
pub struct ClassificationClient<T = HttpTransport> {
    transport: T,
    retry: RetryPolicy,
    governor: Arc<RateGovernor>,
}

impl ClassificationClient<HttpTransport> {
    /// Creates an HTTP client from the pipeline configuration.
    pub fn from_config(
        config: &PipelineConfig,
        governor: Arc<RateGovernor>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            HttpTransport::new(config)?,
            config.client.retry.clone(),
            governor,
        ))
    }
}

impl<T: Transport> ClassificationClient<T> {
    pub fn new(transport: T, retry: RetryPolicy, governor: Arc<RateGovernor>) -> Self {
        Self {
            transport,
            retry,
            governor,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Classifies one image. All failures are returned as a single [`ClientError`].
    pub async fn classify(&self, path: &Path) -> Result<Prediction, ClientError> {
        self.governor.acquire().await;

        let upload = ImageUpload::read(path).await.map_err(|e| ClientError {
            path: path.to_path_buf(),
            attempts: 0,
            kind: ClientErrorKind::Read(e),
        })?;

        let transport = &self.transport;
        let upload = &upload;
        self.retry
            .run(move |attempt| async move {
                tracing::trace!(file = %upload.file_name, attempt, "sending classify request");
                transport.send_once(upload).await
            })
            .await
            .map_err(|failure| ClientError {
                path: path.to_path_buf(),
                attempts: failure.attempts,
                kind: if failure.exhausted {
                    ClientErrorKind::RetriesExhausted(failure.error)
                } else {
                    ClientErrorKind::Rejected(failure.error)
                },
            })
    }
}
