//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sieve_core::Disposition;

use crate::error::ConfigError;
use crate::governor::interval_for;
use crate::retry::RetryPolicy;

/// Default classifier base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";

/// Path of the classify endpoint, relative to the base URL.
pub const CLASSIFY_PATH: &str = "/api/nsfw/classify";

/// Default worker pool width.
pub const DEFAULT_WORKERS: usize = 5;

/// Widest accepted worker pool.
pub const MAX_WORKERS: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Default request rate ceiling.
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: f64 = 12.0;

/// Output folders, one per disposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputDirs {
    pub nsfw: PathBuf,
    pub safe: PathBuf,
    pub review: PathBuf,
}

impl Default for OutputDirs {
    fn default() -> Self {
        Self {
            nsfw: PathBuf::from("nsfw_images"),
            safe: PathBuf::from("safe_images"),
            review: PathBuf::from("review_images"),
        }
    }
}

impl OutputDirs {
    /// Places the three default folder names under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let defaults = Self::default();
        Self {
            nsfw: root.join(defaults.nsfw),
            safe: root.join(defaults.safe),
            review: root.join(defaults.review),
        }
    }

    /// Returns the folder for a disposition.
    pub fn for_disposition(&self, disposition: Disposition) -> &Path {
        match disposition {
            Disposition::Nsfw => &self.nsfw,
            Disposition::Safe => &self.safe,
            Disposition::Review => &self.review,
        }
    }

    /// Returns all three folders.
    pub fn all(&self) -> [&Path; 3] {
        [&self.nsfw, &self.safe, &self.review]
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            pool_max_idle_per_host: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Classifier base URL (without the endpoint path).
    pub api_base_url: String,
    /// Folder scanned (non-recursively) for images.
    pub input_dir: PathBuf,
    /// Destination folders.
    pub output: OutputDirs,
    /// Folder holding `error.log` and `result.log`.
    pub log_dir: PathBuf,
    /// Maximum number of images processed concurrently.
    pub workers: usize,
    /// Ceiling on classify requests per second across all workers.
    pub max_requests_per_second: f64,
    /// HTTP client settings.
    pub client: ClientConfig,
    /// How long closing the result log may wait for the queue to drain.
    pub logger_close_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            input_dir: PathBuf::from("input"),
            output: OutputDirs::default(),
            log_dir: PathBuf::from("logs"),
            workers: DEFAULT_WORKERS,
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            client: ClientConfig::default(),
            logger_close_timeout_secs: 5,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = dir.into();
        self
    }

    pub fn with_output(mut self, output: OutputDirs) -> Self {
        self.output = output;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_requests_per_second(mut self, rate: f64) -> Self {
        self.max_requests_per_second = rate;
        self
    }

    /// Full URL of the classify endpoint.
    pub fn classify_url(&self) -> String {
        format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            CLASSIFY_PATH
        )
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.log_dir.join("error.log")
    }

    pub fn result_log_path(&self) -> PathBuf {
        self.log_dir.join("result.log")
    }

    pub fn logger_close_timeout(&self) -> Duration {
        Duration::from_secs(self.logger_close_timeout_secs)
    }

    /// Checks values that would make the pipeline unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                got: self.workers,
                max: MAX_WORKERS,
            });
        }
        interval_for(self.max_requests_per_second)?;
        self.client.retry.validate()?;
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        Ok(())
    }
}
