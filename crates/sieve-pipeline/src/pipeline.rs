//! Batch orchestration.
//!
//! ## Per-image flow
//!
//! ```text
//! ImageTask → ClassificationClient.classify → decide → FileRelocator.relocate
//!                     │                                        │
//!                     └──── error ──→ error log ←── error ─────┘
//!                                                              │ ok
//!                                                              ▼
//!                                                   ResultLogger.write
//! ```
//!
//! At most `workers` images are in flight. Cancelling the shutdown token stops
//! admission; images already dispatched run to completion, then the result
//! log is drained and closed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use sieve_core::{decide, Decision, Disposition};

use crate::client::{ClassificationClient, HttpTransport, Transport};
use crate::config::{OutputDirs, PipelineConfig};
use crate::error::Result;
use crate::governor::RateGovernor;
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::relocator::FileRelocator;
use crate::result_log::ResultLogger;
use crate::task::{discover, ImageTask};

/// Tracing target for per-image failures. The binary routes it to `error.log`.
pub const FAILURE_TARGET: &str = "sieve::failure";

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub safe: usize,
    pub review: usize,
    pub nsfw: usize,
    pub failed: usize,
    /// Images never dispatched because of shutdown.
    pub not_started: usize,
    /// True if the shutdown token stopped admission.
    pub interrupted: bool,
    /// Lines the result log wrote during this run.
    pub result_lines: u64,
}

impl RunSummary {
    /// Images classified and moved.
    pub fn completed(&self) -> usize {
        self.safe + self.review + self.nsfw
    }

    /// Images moved with the given disposition.
    pub fn count(&self, disposition: Disposition) -> usize {
        match disposition {
            Disposition::Safe => self.safe,
            Disposition::Review => self.review,
            Disposition::Nsfw => self.nsfw,
        }
    }

    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Moved(Disposition::Safe) => self.safe += 1,
            TaskOutcome::Moved(Disposition::Review) => self.review += 1,
            TaskOutcome::Moved(Disposition::Nsfw) => self.nsfw += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TaskOutcome {
    Moved(Disposition),
    Failed,
}

/// Formats the result log line for a moved image.
pub fn result_line(name: &str, decision: &Decision, dest_dir: &Path, moved_to: &Path) -> String {
    let mut line = format!(
        "{} -> {} ({}) | {}",
        name,
        decision.disposition.label(),
        dest_dir.display(),
        decision.trace.summary()
    );
    if let Some(final_name) = moved_to.file_name() {
        if final_name.to_string_lossy() != name {
            line.push_str(&format!(" | renamed:{}", final_name.to_string_lossy()));
        }
    }
    line
}

/// Shared handles one worker needs.
struct Worker<T> {
    client: Arc<ClassificationClient<T>>,
    relocator: Arc<FileRelocator>,
    results: Arc<ResultLogger>,
    output: Arc<OutputDirs>,
    progress: Arc<dyn ProgressSink>,
}

impl<T> Clone for Worker<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            relocator: self.relocator.clone(),
            results: self.results.clone(),
            output: self.output.clone(),
            progress: self.progress.clone(),
        }
    }
}

impl<T: Transport + 'static> Worker<T> {
    async fn process(&self, task: ImageTask) -> TaskOutcome {
        let prediction = match self.client.classify(&task.path).await {
            Ok(p) => p,
            Err(e) => return self.fail(&task.path, e.to_string()),
        };

        if !prediction.is_in_range() {
            tracing::warn!(file = %task.name, ?prediction, "prediction has scores outside [0, 1]");
        }

        let decision = decide(&prediction);
        let dest_dir = self
            .output
            .for_disposition(decision.disposition)
            .to_path_buf();

        let relocator = self.relocator.clone();
        let source = task.path.clone();
        let target = dest_dir.clone();
        let moved = tokio::task::spawn_blocking(move || relocator.relocate(&source, &target)).await;

        let destination = match moved {
            Ok(Ok(dest)) => dest,
            Ok(Err(e)) => return self.fail(&task.path, e.to_string()),
            Err(join) => return self.fail(&task.path, format!("relocation task failed: {join}")),
        };

        let line = result_line(&task.name, &decision, &dest_dir, &destination);
        if let Err(e) = self.results.write(line) {
            tracing::error!(file = %task.name, error = %e, "result line dropped");
        }

        tracing::debug!(
            file = %task.name,
            disposition = %decision.disposition,
            rule = %decision.trace.rule,
            "classified"
        );
        self.progress.on_event(ProgressEvent::Moved {
            path: task.path,
            destination,
            disposition: decision.disposition,
        });
        TaskOutcome::Moved(decision.disposition)
    }

    fn fail(&self, path: &Path, reason: String) -> TaskOutcome {
        tracing::error!(target: FAILURE_TARGET, path = %path.display(), "{reason}");
        self.progress.on_event(ProgressEvent::Failed {
            path: path.to_path_buf(),
            reason,
        });
        TaskOutcome::Failed
    }
}

/// Bounded worker pool over a batch of images.
pub struct Pipeline<T = HttpTransport> {
    worker: Worker<T>,
    input_dir: PathBuf,
    workers: usize,
    close_timeout: Duration,
}

impl Pipeline<HttpTransport> {
    /// Builds the HTTP client, governor, relocator, and result log from config.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let governor = Arc::new(RateGovernor::new(config.max_requests_per_second)?);
        let client = ClassificationClient::from_config(config, governor)?;
        let results = ResultLogger::open(config.result_log_path())?;
        Self::new(config, client, results)
    }
}

impl<T: Transport + 'static> Pipeline<T> {
    /// Assembles a pipeline from an existing client and result log.
    pub fn new(
        config: &PipelineConfig,
        client: ClassificationClient<T>,
        results: ResultLogger,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            worker: Worker {
                client: Arc::new(client),
                relocator: Arc::new(FileRelocator::new()),
                results: Arc::new(results),
                output: Arc::new(config.output.clone()),
                progress: Arc::new(NoProgress),
            },
            input_dir: config.input_dir.clone(),
            workers: config.workers,
            close_timeout: config.logger_close_timeout(),
        })
    }

    /// Sets the progress receiver.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.worker.progress = sink;
        self
    }

    pub fn results(&self) -> &ResultLogger {
        &self.worker.results
    }

    /// Lists images in the configured input folder.
    pub fn discover(&self) -> Result<Vec<ImageTask>> {
        Ok(discover(&self.input_dir)?)
    }

    /// Processes `tasks` and closes the result log.
    pub async fn run(self, tasks: Vec<ImageTask>, shutdown: CancellationToken) -> RunSummary {
        let progress = self.worker.progress.clone();
        let mut summary = RunSummary {
            total: tasks.len(),
            ..RunSummary::default()
        };
        progress.on_event(ProgressEvent::Started {
            total: summary.total,
            workers: self.workers,
        });
        tracing::info!(images = summary.total, workers = self.workers, "starting batch");

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut in_flight = JoinSet::new();
        let mut paths = HashMap::new();
        let mut pending = tasks.into_iter();

        while let Some(task) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.interrupted = true;
                summary.not_started = 1 + pending.len();
                tracing::info!(
                    not_started = summary.not_started,
                    "shutdown requested, waiting for in-flight images"
                );
                break;
            };

            let worker = self.worker.clone();
            let path = task.path.clone();
            let handle = in_flight.spawn(async move {
                let _permit = permit;
                worker.process(task).await
            });
            paths.insert(handle.id(), path);

            while let Some(joined) = in_flight.try_join_next_with_id() {
                self.record_joined(&mut summary, &mut paths, joined);
            }
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            self.record_joined(&mut summary, &mut paths, joined);
        }

        match self.worker.results.close(self.close_timeout).await {
            Ok(lines) => summary.result_lines = lines,
            Err(e) => tracing::error!(error = %e, "failed to close result log"),
        }

        progress.on_event(ProgressEvent::Finished {
            completed: summary.completed(),
            failed: summary.failed,
            not_started: summary.not_started,
        });
        tracing::info!(
            safe = summary.safe,
            review = summary.review,
            nsfw = summary.nsfw,
            failed = summary.failed,
            not_started = summary.not_started,
            "batch finished"
        );
        summary
    }

    /// Counts a finished worker. A panicked worker is reported as a failure
    /// of the image it was processing.
    fn record_joined(
        &self,
        summary: &mut RunSummary,
        paths: &mut HashMap<TaskId, PathBuf>,
        joined: std::result::Result<(TaskId, TaskOutcome), JoinError>,
    ) {
        match joined {
            Ok((id, outcome)) => {
                paths.remove(&id);
                summary.record(outcome);
            }
            Err(e) => {
                let path = paths.remove(&e.id()).unwrap_or_default();
                let outcome = self.worker.fail(&path, format!("worker task failed: {e}"));
                summary.record(outcome);
            }
        }
    }
}
