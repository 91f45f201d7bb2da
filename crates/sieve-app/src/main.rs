//! Sieve - sorts a folder of images into safe, review, and NSFW folders.
//!
//! Every image in the input folder is sent to the classifier service, the
//! scores are mapped to a disposition, and the file is moved. Moves are
//! recorded in `result.log`; per-image failures in `error.log`.

mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sieve_pipeline::{discover, OutputDirs, Pipeline, PipelineConfig, FAILURE_TARGET};
use tokio_util::sync::CancellationToken;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::console::ConsoleProgress;

/// Sieve - concurrent image triage against a remote NSFW classifier
#[derive(Parser, Debug)]
#[command(name = "sieve", version, about)]
struct Args {
    /// Number of images processed concurrently [default: 5]
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Maximum classify requests per second across all workers [default: 12]
    #[arg(long)]
    rate: Option<f64>,

    /// Classifier base URL [default: http://127.0.0.1:3000]
    #[arg(long)]
    api_url: Option<String>,

    /// Folder scanned for images [default: input]
    #[arg(long)]
    input: Option<PathBuf>,

    /// Place the nsfw/safe/review folders under this directory
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Folder for error.log and result.log [default: logs]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// JSON configuration file; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Layers defaults, the optional JSON file, and command-line flags.
fn build_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(threads) = args.threads {
        config.workers = threads;
    }
    if let Some(rate) = args.rate {
        config.max_requests_per_second = rate;
    }
    if let Some(url) = &args.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(input) = &args.input {
        config.input_dir = input.clone();
    }
    if let Some(root) = &args.output_root {
        config.output = OutputDirs::under(root);
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Creates the input, output, and log folders if missing.
fn prepare_dirs(config: &PipelineConfig) -> anyhow::Result<()> {
    let dirs = [config.input_dir.as_path(), config.log_dir.as_path()]
        .into_iter()
        .chain(config.output.all());
    for dir in dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create folder {}", dir.display()))?;
    }
    Ok(())
}

/// Console layer for everything except per-image failures, which go to
/// `error.log` only.
fn build_subscriber<W>(
    args: &Args,
    log_dir: &Path,
    console_writer: W,
) -> anyhow::Result<(impl Subscriber + Send + Sync + 'static, WorkerGuard)>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sieve={},warn", log_level)))
        .add_directive(format!("{FAILURE_TARGET}=off").parse()?);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("error.log")
        .build(log_dir)
        .context("failed to open error log")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let console = fmt::layer()
        .with_writer(console_writer)
        .with_filter(env_filter);
    let failures = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_filter(Targets::new().with_target(FAILURE_TARGET, LevelFilter::ERROR));

    let subscriber = tracing_subscriber::registry().with(console).with(failures);
    Ok((subscriber, guard))
}

fn init_logging(args: &Args, log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let (subscriber, guard) = build_subscriber(args, log_dir, std::io::stderr)?;
    subscriber
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

/// Cancels `token` on Ctrl+C or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Signal received, finishing in-flight images");
        token.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;
    prepare_dirs(&config)?;

    // Keep the guard alive so error.log is flushed on exit
    let _log_guard = init_logging(&args, &config.log_dir)?;

    tracing::info!("Starting Sieve...");
    tracing::debug!("Config: {}", serde_json::to_string(&config)?);

    let tasks = discover(&config.input_dir).with_context(|| {
        format!("failed to read input folder {}", config.input_dir.display())
    })?;
    if tasks.is_empty() {
        println!("No images found in {}", config.input_dir.display());
        return Ok(());
    }

    let pipeline = Pipeline::from_config(&config)
        .context("failed to start pipeline")?
        .with_progress(Arc::new(ConsoleProgress::new()));

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let summary = pipeline.run(tasks, shutdown).await;
    println!("{}", console::summary(&summary, &config));

    tracing::info!("Sieve finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory console for inspecting what the console layer printed.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("sieve").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_without_flags() {
        let config = build_config(&parse(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "-t",
            "8",
            "--rate",
            "2.5",
            "--api-url",
            "http://10.0.0.5:3000",
            "--output-root",
            "/data/out",
            "--log-dir",
            "/data/logs",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_requests_per_second, 2.5);
        assert_eq!(config.api_base_url, "http://10.0.0.5:3000");
        assert_eq!(config.output.nsfw, PathBuf::from("/data/out/nsfw_images"));
        assert_eq!(config.result_log_path(), PathBuf::from("/data/logs/result.log"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sieve.json");
        std::fs::write(&path, r#"{"workers": 2, "input_dir": "photos"}"#).unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--threads", "9"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.workers, 9);
        assert_eq!(config.input_dir, PathBuf::from("photos"));
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(build_config(&parse(&["--threads", "0"])).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let args = parse(&["--config", missing.to_str().unwrap()]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn prepare_dirs_creates_all_folders() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::new()
            .with_input_dir(dir.path().join("input"))
            .with_output(OutputDirs::under(dir.path().join("out")))
            .with_log_dir(dir.path().join("logs"));

        prepare_dirs(&config).unwrap();
        assert!(config.input_dir.is_dir());
        assert!(config.log_dir.is_dir());
        for out in config.output.all() {
            assert!(out.is_dir());
        }
    }

    #[test]
    fn failures_go_to_error_log_and_not_the_console() {
        let dir = TempDir::new().unwrap();
        let console = Captured::default();
        let writer = console.clone();

        let (subscriber, guard) =
            build_subscriber(&parse(&[]), dir.path(), move || writer.clone()).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: FAILURE_TARGET, path = "in/a.jpg", "HTTP 400: bad image");
            tracing::error!(target: "sieve::pipeline", "result log unavailable");
            tracing::info!(target: "sieve::pipeline", "starting batch");
        });
        // Dropping the guard flushes the non-blocking writer
        drop(guard);

        let error_log = std::fs::read_to_string(dir.path().join("error.log")).unwrap();
        let lines: Vec<&str> = error_log.lines().collect();
        assert_eq!(lines.len(), 1, "{error_log}");
        assert!(lines[0].contains("ERROR"));
        assert!(lines[0].contains("HTTP 400: bad image"));
        assert!(lines[0].contains("in/a.jpg"));
        assert!(!error_log.contains("result log unavailable"));

        let printed = console.contents();
        assert!(printed.contains("result log unavailable"));
        assert!(printed.contains("starting batch"));
        assert!(!printed.contains("bad image"));
    }
}
