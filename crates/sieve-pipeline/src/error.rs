//! Error types for the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single request attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The endpoint answered with a non-200 status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The attempt exceeded the per-request timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (refused, reset, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The 200 body was not a valid prediction.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl AttemptError {
    /// Returns the HTTP status, if the endpoint answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Why classification of one file failed.
#[derive(Debug, Error)]
pub enum ClientErrorKind {
    /// The image could not be read from disk.
    #[error("failed to read image: {0}")]
    Read(#[from] std::io::Error),

    /// A terminal failure: non-retryable status or undecodable body.
    #[error("{0}")]
    Rejected(AttemptError),

    /// Every attempt failed with a transient error.
    #[error("retries exhausted: {0}")]
    RetriesExhausted(AttemptError),
}

/// Classification failure for one file, reported once per task.
#[derive(Debug, Error)]
#[error("classification failed for {} after {attempts} attempt(s): {kind}", .path.display())]
pub struct ClientError {
    pub path: PathBuf,
    pub attempts: u32,
    #[source]
    pub kind: ClientErrorKind,
}

/// Filesystem failure while moving a file. The source is left in place.
#[derive(Debug, Error)]
#[error("failed to move {} -> {}: {source}", .from.display(), .to.display())]
pub struct MoveError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Result log errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// IO error opening or writing the log file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The logger was closed; the line was not accepted.
    #[error("result log is closed")]
    Closed,

    /// The writer did not drain within the close timeout.
    #[error("result log did not drain within {0:?}")]
    DrainTimeout(std::time::Duration),

    /// The writer task panicked or was cancelled.
    #[error("result log writer failed: {0}")]
    Writer(String),
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("worker count must be at most {max}, got {got}")]
    TooManyWorkers { got: usize, max: usize },

    #[error("request rate must be a positive number, got {0}")]
    InvalidRate(f64),

    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),

    #[error("API base URL is empty")]
    EmptyBaseUrl,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Pipeline error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Result log error.
    #[error("Result log error: {0}")]
    Log(#[from] LogError),

    /// IO error (e.g., listing the input folder).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_names_path_and_cause() {
        let err = ClientError {
            path: PathBuf::from("in/cat.jpg"),
            attempts: 4,
            kind: ClientErrorKind::RetriesExhausted(AttemptError::Status {
                status: 503,
                message: "busy".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("in/cat.jpg"));
        assert!(msg.contains("4 attempt(s)"));
        assert!(msg.contains("HTTP 503: busy"));
    }

    #[test]
    fn move_error_names_both_paths() {
        let err = MoveError {
            from: PathBuf::from("in/a.png"),
            to: PathBuf::from("safe/a.png"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("in/a.png -> safe/a.png"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn attempt_status_accessor() {
        assert_eq!(
            AttemptError::Status {
                status: 404,
                message: String::new()
            }
            .status(),
            Some(404)
        );
        assert_eq!(AttemptError::Timeout.status(), None);
    }
}
