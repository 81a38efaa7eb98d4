//! Tracing subscriber setup shared by the binaries.

use std::fs::OpenOptions;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::sanitize::SanitizingMakeWriter;
use crate::config::{LogConfig, LogMode};

/// Install the global subscriber: `RUST_LOG` filter (default `info`), a
/// non-blocking writer for the configured sink, and log sanitization.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes pending output.
///
/// # Errors
/// Returns error if the log file cannot be opened.
pub fn init(config: &LogConfig) -> std::io::Result<WorkerGuard> {
    let (writer, guard) = match config.mode {
        LogMode::File => {
            if let Some(parent) = config.file.parent() {
                // Best-effort: a missing directory surfaces as the open error below.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file)?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogMode::Auto => tracing_appender::non_blocking(std::io::stderr()),
    };

    // A subscriber installed earlier (tests, embedding) wins.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .try_init();

    Ok(guard)
}
