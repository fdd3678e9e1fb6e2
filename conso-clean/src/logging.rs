//! Logging setup for the cleaning stage.
//!
//! The stage logs through `tracing`. This module installs the subscriber the
//! orchestrator expects: a console layer and/or a durable log file, where the
//! file can be cleared before the first write of a run.

use crate::prelude::*;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;

/// How the log file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Clear the file before the first write of this run
    #[default]
    Truncate,
    /// Keep previous runs and append to the end
    Append,
}

/// Configuration for the logging sink.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for dependencies (DataFusion, object store, ...)
    pub level: Level,
    /// Log level for this crate
    pub crate_level: Level,
    /// Whether to use JSON output format
    pub json_format: bool,
    /// Whether events are written to stderr
    pub console: bool,
    /// Durable log file, if any
    pub log_file: Option<PathBuf>,
    /// How the log file is opened
    pub file_mode: FileMode,
    /// Environment filter override
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            crate_level: Level::INFO,
            json_format: false,
            console: true,
            log_file: None,
            file_mode: FileMode::Truncate,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Creates a configuration for development use.
    pub fn development() -> Self {
        Self {
            level: Level::INFO,
            crate_level: Level::DEBUG,
            ..Default::default()
        }
    }

    /// Console plus a log file cleared at the start of the run.
    pub fn batch(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(log_file.into()),
            file_mode: FileMode::Truncate,
            ..Default::default()
        }
    }

    /// Sets whether to use JSON output format.
    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Enables or disables the console layer.
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Sets the log file and how it is opened.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>, mode: FileMode) -> Self {
        self.log_file = Some(path.into());
        self.file_mode = mode;
        self
    }

    /// Sets a custom environment filter.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Builds the environment filter string.
    pub fn env_filter(&self) -> String {
        if let Some(ref filter) = self.env_filter {
            filter.clone()
        } else {
            format!(
                "{},conso_clean={}",
                self.level.as_str().to_lowercase(),
                self.crate_level.as_str().to_lowercase()
            )
        }
    }
}

/// Opens the durable log file, creating parent directories.
pub fn open_log_file(path: &Path, mode: FileMode) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        FileMode::Truncate => options.write(true).truncate(true),
        FileMode::Append => options.append(true),
    };
    Ok(options.open(path)?)
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured levels. Fails if a
/// global subscriber is already installed.
///
/// # Examples
///
/// ```rust,no_run
/// use conso_clean::logging::{init_logging, LoggingConfig};
///
/// init_logging(LoggingConfig::batch("logs/02_nettoyage.log")).unwrap();
/// ```
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

    let console_layer = config.console.then(|| {
        if config.json_format {
            fmt::layer().with_writer(std::io::stderr).json().boxed()
        } else {
            fmt::layer().with_writer(std::io::stderr).boxed()
        }
    });

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = open_log_file(path, config.file_mode)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            Some(if config.json_format {
                layer.json().boxed()
            } else {
                layer.boxed()
            })
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CleanError::Logging(e.to_string()))
}

/// Truncates a string to the maximum field length if needed.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}
