//! Sieve Pipeline - concurrent classify-and-relocate over a folder of images.
//!
//! Each image is uploaded to a remote NSFW classifier, the returned scores
//! are mapped to a disposition by [`sieve_core::decide`], and the file is
//! moved into the matching output folder.
//!
//! ## Architecture
//!
//! ```text
//! input/ → discover → Pipeline (N workers)
//!                          │
//!                          ▼
//!            ClassificationClient ── RateGovernor (shared)
//!                          │          RetryPolicy
//!                          ▼
//!                       decide
//!                          │
//!             ┌────────────┼────────────┐
//!             ▼            ▼            ▼
//!        safe_images  review_images  nsfw_images   (FileRelocator)
//!                          │
//!                          ▼
//!                 ResultLogger → result.log
//! ```
//!
//! Per-image failures are emitted as `tracing` errors on [`FAILURE_TARGET`];
//! the binary routes that target to `error.log`.

pub mod client;
pub mod config;
mod error;
pub mod governor;
mod pipeline;
pub mod progress;
pub mod relocator;
pub mod result_log;
pub mod retry;
pub mod task;

pub use client::{ClassificationClient, HttpTransport, ImageUpload, Transport};
pub use config::{ClientConfig, OutputDirs, PipelineConfig};
pub use error::{
    AttemptError, ClientError, ClientErrorKind, ConfigError, LogError, MoveError, PipelineError,
    Result,
};
pub use governor::RateGovernor;
pub use pipeline::{result_line, Pipeline, RunSummary, FAILURE_TARGET};
pub use progress::{NoProgress, ProgressEvent, ProgressSink};
pub use relocator::FileRelocator;
pub use result_log::ResultLogger;
pub use retry::RetryPolicy;
pub use task::{discover, ImageTask};
