//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `orgstore_core` wiring against the configured backend.
//! - Keep output deterministic for quick local sanity checks.

use log::error;
use orgstore_core::{init_logging, open_repository, Config, ListQuery, OpContext};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error error={message}");
            eprintln!("orgstore: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = Config::from_env().map_err(|err| err.to_string())?;
    if config.logging.directory.is_some() {
        init_logging(&config.logging)?;
    }

    let repo = open_repository(&config.storage).map_err(|err| err.to_string())?;
    let page = repo
        .list(&OpContext::new(), &ListQuery::default())
        .map_err(|err| err.to_string())?;

    println!("orgstore_core version={}", orgstore_core::core_version());
    println!("orgstore backend={}", config.storage.backend.as_str());
    println!("orgstore organizations={}", page.total);
    Ok(())
}
