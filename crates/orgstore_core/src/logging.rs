//! Logging bootstrap for the organization store.
//!
//! # Responsibility
//! - Start the rolling file logger described by `LoggingConfig`, once per process.
//! - Route panics into the log with a sanitized payload.
//!
//! # Invariants
//! - A second call with the same directory and level is a no-op.
//! - A second call with another directory or level is rejected, never applied.
//! - Log lines carry identifiers and counts only, never organization payloads.

use crate::config::LoggingConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "orgstore";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    level: &'static str,
    directory: PathBuf,
    _handle: LoggerHandle,
}

impl ActiveLogger {
    fn ensure_matches(&self, level: &str, directory: &Path) -> Result<(), String> {
        if self.directory != directory {
            return Err(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                self.directory.display(),
                directory.display()
            ));
        }
        if self.level != level {
            return Err(format!(
                "logging already initialized with level `{}`; refusing to switch to `{level}`",
                self.level
            ));
        }
        Ok(())
    }
}

/// Starts file logging from `config`.
///
/// # Errors
/// - The level is not one of `trace|debug|info|warn|error`.
/// - The directory is unset, relative, or cannot be created.
/// - Logging is already active with another directory or level.
/// - The flexi_logger backend fails to start.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let level = normalize_level(&config.level)?;
    let directory = normalize_log_dir(config.directory.as_deref())?;

    if let Some(active) = ACTIVE_LOGGER.get() {
        return active.ensure_matches(level, &directory);
    }

    // A concurrent caller may win the race; its settings are checked below.
    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(level, &directory))?;
    active.ensure_matches(level, &directory)
}

fn start_logger(level: &'static str, directory: &Path) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(directory).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            directory.display()
        )
    })?;

    let handle = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(directory)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();
    info!(
        "event=logging_init module=logging status=ok level={level} log_dir={} version={}",
        directory.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        level,
        directory: directory.to_path_buf(),
        _handle: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(directory: Option<&Path>) -> Result<PathBuf, String> {
    let Some(directory) = directory else {
        return Err("log directory is not configured".to_string());
    };
    if !directory.is_absolute() {
        return Err(format!(
            "log directory must be an absolute path, got `{}`",
            directory.display()
        ));
    }
    Ok(directory.to_path_buf())
}

/// Only called from inside the `OnceCell` initializer, so it runs at most once.
fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={location} payload={}",
            single_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens `value` onto one line and caps it at `max_chars` characters.
fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut capped: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        capped.push_str("...");
    }
    capped
}
