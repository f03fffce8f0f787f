//! `mcpproxy auth login/status`: drives the OAuth 2.1
//! flow for one upstream against an already-running daemon. `login`
//! prints the authorization URL the user opens in a browser; the
//! loopback listener (`crate::oauth_callback`) completes the flow.

use super::{dial, request_ok};
use crate::cli::error::CliError;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub action: AuthAction,
}

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Starts (or restarts) the authorization-code flow for `server`.
    Login { server: String },
    /// Reports whether `server` currently holds a valid access token.
    Status { server: String },
}

pub async fn run(args: AuthArgs, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let dialer = dial(&config_path)?;
    match args.action {
        AuthAction::Login { server } => {
            let data = request_ok(&dialer, "POST", &format!("/api/v1/servers/{server}/login"), None).await?;
            let url = data.get("authorization_url").and_then(serde_json::Value::as_str).unwrap_or("<unknown>");
            println!("Open this URL to finish signing in:\n {url}");
        }
        AuthAction::Status { server } => {
            let servers = request_ok(&dialer, "GET", "/api/v1/servers", None).await?;
            let entry = servers
                .as_array()
                .and_then(|list| list.iter().find(|m| m.get("config").and_then(|c| c.get("name")).and_then(serde_json::Value::as_str) == Some(server.as_str())))
                .cloned();
            match entry {
                Some(managed) => {
                    let authenticated = managed.get("oauth_status").and_then(|s| s.get("authenticated")).and_then(serde_json::Value::as_bool).unwrap_or(false);
                    let expires_at = managed.get("oauth_status").and_then(|s| s.get("expires_at")).cloned().unwrap_or(serde_json::Value::Null);
                    if authenticated {
                        println!("{server}: authenticated (expires_at: {expires_at})");
                    } else {
                        println!("{server}: not authenticated");
                    }
                }
                None => println!("{server}: no such upstream server"),
            }
        }
    }
    Ok(())
}
