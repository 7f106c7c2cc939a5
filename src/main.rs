//! `nodeflow` command-line entry point.
//!
//! Every command prints one JSON envelope to stdout:
//!
//! ```text
//! {"success": true, ...payload}
//! {"success": false, "error": "..."}
//! ```
//!
//! Logs go to stderr and, when enabled in the config, to rolling files. The exit status is
//! non-zero whenever `success` is false.

#![expect(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::Parser as _;
use nodeflow::config::{self, AppConfig};
use nodeflow::logging;
use nodeflow::response::Response;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let loaded: anyhow::Result<AppConfig> = match &cli.config {
        _ if !cli.command.reads_config() => Ok(AppConfig::default()),
        Some(path) => config::load_from(path),
        None => Ok(config::load_app_config()),
    };

    let response = match loaded {
        Ok(config) => {
            if let Err(e) = logging::init(config.settings()) {
                eprintln!("Logging disabled: {e:#}");
            }
            let result = cli::run_command(cli.command, &config, cli.config.as_deref());
            if let Err(e) = &result {
                tracing::error!("{e:#}");
            }
            Response::from_result(result.map_err(|e| format!("{e:#}")))
        }
        Err(e) => Response::failure(format!("{e:#}")),
    };

    match serde_json::to_string_pretty(&response) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize response: {e}");
            return ExitCode::FAILURE;
        }
    }
    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
