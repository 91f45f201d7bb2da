//! Console output: per-image progress and the end-of-run summary.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use sieve_core::Disposition;
use sieve_pipeline::{PipelineConfig, ProgressEvent, ProgressSink, RunSummary};

/// Prints one line per finished image to stdout. Failures are counted but
/// not named; their details live in `error.log`.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    total: AtomicUsize,
    done: AtomicUsize,
    failed: AtomicUsize,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> (usize, usize) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        (done, self.total.load(Ordering::SeqCst))
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_event(&self, event: ProgressEvent) {
        let line = match event {
            ProgressEvent::Started { total, workers } => {
                self.total.store(total, Ordering::SeqCst);
                banner(total, workers)
            }
            ProgressEvent::Moved {
                path, disposition, ..
            } => {
                let (done, total) = self.tick();
                format!("[{done}/{total}] {} -> {}", file_name(&path), disposition.label())
            }
            ProgressEvent::Failed { .. } => {
                let (done, total) = self.tick();
                let failed = self.failed.fetch_add(1, Ordering::SeqCst) + 1;
                failure_line(done, total, failed)
            }
            ProgressEvent::Finished { .. } => return,
        };
        let _ = writeln!(std::io::stdout().lock(), "{line}");
    }
}

fn failure_line(done: usize, total: usize, failed: usize) -> String {
    format!("[{done}/{total}] failed ({failed} so far)")
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn banner(total: usize, workers: usize) -> String {
    format!("Found {total} image(s), classifying with {workers} worker(s)")
}

/// Formats the end-of-run report.
pub fn summary(summary: &RunSummary, config: &PipelineConfig) -> String {
    let mut out = String::new();
    if summary.interrupted {
        out.push_str("Interrupted: finished in-flight images, skipped the rest\n");
    }
    out.push_str(&format!(
        "Processed {} of {} image(s)\n",
        summary.completed() + summary.failed,
        summary.total
    ));
    for disposition in Disposition::all() {
        out.push_str(&format!(
            "  {:<7} {:>5}  -> {}\n",
            disposition.label(),
            summary.count(*disposition),
            config.output.for_disposition(*disposition).display()
        ));
    }
    out.push_str(&format!(
        "  {:<7} {:>5}  -> {}\n",
        "FAILED",
        summary.failed,
        config.error_log_path().display()
    ));
    if summary.not_started > 0 {
        out.push_str(&format!("  {:<7} {:>5}\n", "SKIPPED", summary.not_started));
    }
    out.push_str(&format!("Results: {}", config.result_log_path().display()));
    out
}
