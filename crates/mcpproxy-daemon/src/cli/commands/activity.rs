//! `mcpproxy activity list [--intent-type …]`: queries
//! the append-only activity log on a running daemon via
//! `GET /api/v1/activity`.

use super::{dial, request_ok};
use crate::cli::error::CliError;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ActivityArgs {
    #[command(subcommand)]
    pub action: ActivityAction,
}

#[derive(Subcommand, Debug)]
pub enum ActivityAction {
    /// Lists activity records, most recent first, optionally filtered.
    List {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        tool: Option<String>,
        #[arg(long, value_name = "TYPE")]
        kind: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        intent_type: Option<String>,
        #[arg(long)]
        request_id: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

pub async fn run(args: ActivityArgs, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let dialer = dial(&config_path)?;
    let ActivityAction::List { server, tool, kind, status, intent_type, request_id, since, until, limit } = args.action;

    let mut query = Vec::new();
    if let Some(v) = server { query.push(("server_name".to_string(), v)) }
    if let Some(v) = tool { query.push(("tool_name".to_string(), v)) }
    if let Some(v) = kind { query.push(("type".to_string(), v)) }
    if let Some(v) = status { query.push(("status".to_string(), v)) }
    if let Some(v) = intent_type { query.push(("intent_type".to_string(), v)) }
    if let Some(v) = request_id { query.push(("request_id".to_string(), v)) }
    if let Some(v) = since { query.push(("since".to_string(), v)) }
    if let Some(v) = until { query.push(("until".to_string(), v)) }
    query.push(("limit".to_string(), limit.to_string()));

    let path = format!("/api/v1/activity?{}", url_encode_pairs(&query));
    let data = request_ok(&dialer, "GET", &path, None).await?;

    let records = data.get("records").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
    if records.is_empty() {
        println!("no matching activity records");
        return Ok(());
    }
    for record in &records {
        println!(
            "{} {} server={} tool={} status={} request_id={}",
            record.get("timestamp").and_then(serde_json::Value::as_str).unwrap_or("?"),
            record.get("kind").and_then(serde_json::Value::as_str).unwrap_or("?"),
            record.get("server_name").and_then(serde_json::Value::as_str).unwrap_or("-"),
            record.get("tool_name").and_then(serde_json::Value::as_str).unwrap_or("-"),
            record.get("status").and_then(serde_json::Value::as_str).unwrap_or("?"),
            record.get("request_id").and_then(serde_json::Value::as_str).unwrap_or("-"),
        );
    }
    Ok(())
}

fn url_encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", url_encode(k), url_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn url_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
