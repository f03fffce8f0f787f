//! `mcpproxy doctor`: a handful of local checks plus,
//! when a daemon is already listening, a live `/ready` probe. Prints a
//! plain pass/fail report; never itself maps to a non-zero exit beyond
//! the usual "could not even load the config" failure, since "some
//! checks failed" is informational, not an invocation error.

use super::dial;
use crate::cli::error::CliError;
use crate::{config::Config, paths};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DoctorArgs;

fn check(label: &str, ok: bool, detail: &str) {
    let mark = if ok { "OK" } else { "FAIL" };
    println!("[{mark}] {label}: {detail}");
}

pub async fn run(_args: DoctorArgs, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = config_path.clone().unwrap_or_else(paths::config_path);
    match Config::load(&path) {
        Ok(config) => {
            check("config file", true, &path.display().to_string());

            match mcpproxy_storage::Database::open(paths::database_path()) {
                Ok(_) => check("database", true, &paths::database_path().display().to_string()),
                Err(e) => check("database", false, &format!("{e} (likely already held by a running daemon)")),
            }

            match dial(&config_path) {
                Ok(dialer) => match dialer.request("GET", "/ready", None).await {
                    Ok(_) => check("daemon reachable", true, if dialer.is_trusted() { "via trusted socket" } else { "via TCP" }),
                    Err(e) => check("daemon reachable", false, &e.to_string()),
                },
                Err(e) => check("daemon reachable", false, &e.to_string()),
            }

            check("logs directory", paths::logs_dir().exists() || std::fs::create_dir_all(paths::logs_dir()).is_ok(), &paths::logs_dir().display().to_string());
            check("upstream servers configured", true, &config.servers.len().to_string());
        }
        Err(e) => {
            check("config file", false, &e.to_string());
            return Err(CliError::Proxy(mcpproxy_core::error::ProxyError::infrastructure(mcpproxy_core::error::ErrorCode::ConfigError, e.to_string())));
        }
    }
    Ok(())
}
