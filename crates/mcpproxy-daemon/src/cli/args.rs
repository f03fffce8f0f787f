//! Top-level argument parsing: `serve`,
//! `auth login/status`, `doctor`, `logs --request-id`,
//! `activity list [--intent-type …]`,
//! `call tool-read|tool-write|tool-destructive <server:tool> --args <json>
//! [--reason …] [--sensitivity …]`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mcpproxy", version, about = "Local multiplexing MCP gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repeat for more detail (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Override `~/.mcpproxy/mcp_config.json`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the daemon: spawns every configured upstream, binds the
    /// REST/SSE surface and the OAuth loopback listener.
    Serve(super::commands::serve::ServeArgs),

    /// OAuth 2.1 login flows for upstreams that require them.
    Auth(super::commands::auth::AuthArgs),

    /// Diagnose a running (or non-running) daemon: config validity, DB
    /// accessibility, listen address reachability.
    Doctor(super::commands::doctor::DoctorArgs),

    /// Tail or filter persisted log files.
    Logs(super::commands::logs::LogsArgs),

    /// Query the append-only activity log.
    Activity(super::commands::activity::ActivityArgs),

    /// Invoke a built-in `call_tool_*` variant against a running daemon.
    Call(super::commands::call::CallArgs),
}
