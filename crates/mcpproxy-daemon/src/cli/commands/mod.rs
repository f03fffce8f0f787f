//! CLI command implementations. Everything but [`serve`] is a thin
//! client that dials an already-running daemon over whichever local
//! transport is reachable.

pub mod activity;
pub mod auth;
pub mod call;
pub mod doctor;
pub mod logs;
pub mod serve;

use crate::cli::error::CliError;
use crate::{config::Config, paths};
use mcpproxy_transport::Dialer;
use std::path::PathBuf;

/// Prefers the trusted Unix socket (no API key required) over the
/// configured TCP listener, mirroring how the tray itself would reach
/// the core.
pub(crate) fn dial(config_path: &Option<PathBuf>) -> Result<Dialer, CliError> {
    let path = config_path.clone().unwrap_or_else(paths::config_path);
    let config = Config::load(&path)
        .map_err(|e| CliError::Proxy(mcpproxy_core::error::ProxyError::infrastructure(mcpproxy_core::error::ErrorCode::ConfigError, e.to_string())))?;

    let socket = paths::socket_path();
    let endpoint = if socket.exists() { format!("unix://{}", socket.display()) } else { format!("http://{}", config.listen_addr) };
    Ok(Dialer::new(&endpoint, config.api_key)?)
}

/// Unwraps the `{success, data}` envelope or converts
/// an `{error, message, request_id}` body into a reportable [`CliError`].
pub(crate) async fn request_ok(dialer: &Dialer, method: &str, path: &str, body: Option<serde_json::Value>) -> Result<serde_json::Value, CliError> {
    let value = dialer.request(method, path, body).await?;
    if value.get("success").and_then(serde_json::Value::as_bool) == Some(true) {
        Ok(value.get("data").cloned().unwrap_or(serde_json::Value::Null))
    } else {
        Err(CliError::from_error_body(&value))
    }
}
