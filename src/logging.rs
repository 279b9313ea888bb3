//! Logging setup for the loader binary.
//!
//! Two `tracing` layers are installed: a human-readable one on stderr (INFO by
//! default, DEBUG with `--verbose`) and, when a log file is requested, a plain
//! text one at DEBUG. `RUST_LOG` replaces the default filter when set.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Where and how much to log.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log DEBUG to stderr as well
    pub verbose: bool,
    /// File receiving the DEBUG log
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Log next to the first input, as `<input>.log`.
    #[must_use]
    pub fn beside(input: &Path, verbose: bool) -> Self {
        let mut name = input.as_os_str().to_os_string();
        name.push(".log");
        LogConfig {
            verbose,
            file: Some(PathBuf::from(name)),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive until the program exits.
///
/// # Errors
///
/// Returns an error if `RUST_LOG` cannot be parsed, the log file cannot be
/// created, or a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::try_new(directives).context("invalid RUST_LOG")?,
        Err(_) => EnvFilter::new("debug"),
    };
    let console_level = if config.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_level);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log path {} has no file name", path.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(name.to_string_lossy())
                .build(dir)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install the log subscriber")?;

    Ok(guard)
}
