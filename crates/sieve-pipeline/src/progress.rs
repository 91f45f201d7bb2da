//! Progress reporting for the binary's console output.

use std::path::PathBuf;

use sieve_core::Disposition;

/// Events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The batch is starting.
    Started { total: usize, workers: usize },
    /// An image was classified and moved.
    Moved {
        path: PathBuf,
        destination: PathBuf,
        disposition: Disposition,
    },
    /// An image was left in place because of an error.
    Failed { path: PathBuf, reason: String },
    /// The batch is over.
    Finished {
        completed: usize,
        failed: usize,
        not_started: usize,
    },
}

/// Receives progress events. Called from worker tasks.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_event(&self, _event: ProgressEvent) {}
}
