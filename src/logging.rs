//! Logging setup for the `nodeflow` binary.
//!
//! Library code only emits `tracing` events; this module installs the subscriber. Console
//! output goes to stderr because stdout carries the JSON response envelope. When file
//! logging is enabled, two daily-rotated files are written under the data directory:
//!
//! - `nodeflow.log`: everything that passes the level filter
//! - `error.log`: warnings and errors only
//!
//! ```no_run
//! use nodeflow::config::EngineSettings;
//! use nodeflow::logging;
//!
//! logging::init(&EngineSettings::default())?;
//! tracing::info!("ready");
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::EngineSettings;
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Gets the log directory path based on platform conventions
///
/// - Windows: `%APPDATA%/nodeflow/logs`
/// - macOS: `~/Library/Application Support/nodeflow/logs`
/// - Linux: `~/.local/share/nodeflow/logs`
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join("nodeflow").join("logs"))
}

fn rolling_appender(log_dir: &std::path::Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Installs the global subscriber. `RUST_LOG` overrides `settings.log_level`.
///
/// # Errors
///
/// Returns error if the filter is invalid, the log directory cannot be created, or a
/// subscriber is already installed.
pub fn init(settings: &EngineSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("Failed to create env filter")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let file_layers = if settings.log_to_file {
        let log_dir = get_log_dir()?;
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        let all_logs_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(rolling_appender(&log_dir, "nodeflow")?);

        let error_logs_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(rolling_appender(&log_dir, "error")?)
            .with_filter(EnvFilter::new("warn"));

        Some(all_logs_layer.and_then(error_logs_layer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(to_file = settings.log_to_file, "Logging initialized");
    Ok(())
}
