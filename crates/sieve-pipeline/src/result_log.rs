//! Append-only result log with a single background writer.
//!
//! Producers enqueue lines without touching the disk. One blocking task drains
//! the queue in FIFO order, prefixes a local timestamp, appends, and flushes
//! after every line. [`ResultLogger::close`] drops the only sender, so the
//! writer finishes everything accepted before it and then exits.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::LogError;

/// Timestamp prefix format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ordered, non-blocking result log.
#[derive(Debug)]
pub struct ResultLogger {
    path: PathBuf,
    sender: RwLock<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<io::Result<u64>>>>,
}

impl ResultLogger {
    /// Opens (or creates) the log file for appending and starts the writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::task::spawn_blocking(move || drain(file, rx));

        Ok(Self {
            path,
            sender: RwLock::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enqueues a line. Returns immediately; fails only once the log is closed.
    pub fn write(&self, line: impl Into<String>) -> Result<(), LogError> {
        let sender = self.sender.read();
        match sender.as_ref() {
            Some(tx) => tx.send(line.into()).map_err(|_| LogError::Closed),
            None => Err(LogError::Closed),
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Stops accepting lines and waits up to `timeout` for the queue to drain.
    ///
    /// Returns the number of lines written. A second call returns `Ok(0)`.
    pub async fn close(&self, timeout: Duration) -> Result<u64, LogError> {
        self.sender.write().take();

        let Some(writer) = self.writer.lock().take() else {
            return Ok(0);
        };

        match tokio::time::timeout(timeout, writer).await {
            Err(_) => Err(LogError::DrainTimeout(timeout)),
            Ok(Err(join)) => Err(LogError::Writer(join.to_string())),
            Ok(Ok(written)) => Ok(written?),
        }
    }
}

fn drain(file: File, mut rx: mpsc::UnboundedReceiver<String>) -> io::Result<u64> {
    let mut out = BufWriter::new(file);
    let mut written = 0;

    while let Some(line) = rx.blocking_recv() {
        let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
        if let Err(e) = writeln!(out, "{stamp} - {line}").and_then(|_| out.flush()) {
            tracing::error!(error = %e, "failed to append to result log");
            return Err(e);
        }
        written += 1;
    }

    Ok(written)
}
