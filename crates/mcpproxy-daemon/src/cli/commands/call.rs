//! `mcpproxy call tool-read|tool-write|tool-destructive <server:tool>
//! --args <json> [--reason …] [--sensitivity …]`: drives
//! the same JSON-RPC `tools/call` a downstream MCP client would send,
//! against `POST /mcp` on a running daemon.

use super::dial;
use crate::cli::error::CliError;
use clap::{Args, Subcommand, ValueEnum};
use mcpproxy_protocol::jsonrpc::{Request, RequestId};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(subcommand)]
    pub variant: CallVariant,
}

#[derive(Subcommand, Debug)]
pub enum CallVariant {
    /// `call_tool_read` — `intent.operation_type = "read"`.
    ToolRead(CallOne),
    /// `call_tool_write` — `intent.operation_type = "write"`.
    ToolWrite(CallOne),
    /// `call_tool_destructive` — `intent.operation_type = "destructive"`.
    ToolDestructive(CallOne),
}

#[derive(Args, Debug)]
pub struct CallOne {
    /// `server:tool`, the qualified name `retrieve_tools` returns.
    pub target: String,

    /// JSON object passed as the tool's own call arguments.
    #[arg(long)]
    pub args: Option<String>,

    /// Free-text justification recorded on the activity log.
    #[arg(long)]
    pub reason: Option<String>,

    /// One of `public`, `internal`, `private`, `unknown`.
    #[arg(long, value_enum)]
    pub sensitivity: Option<Sensitivity>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Sensitivity {
    Public,
    Internal,
    Private,
    Unknown,
}

impl Sensitivity {
    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Private => "private",
            Self::Unknown => "unknown",
        }
    }
}

fn invalid_args(raw: &str, e: serde_json::Error) -> CliError {
    CliError::Proxy(mcpproxy_core::error::ProxyError::validation(
        mcpproxy_core::error::ErrorCode::InvalidArgument,
        format!("--args '{raw}' is not valid JSON: {e}"),
    ))
}

pub async fn run(args: CallArgs, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let (tool_name, call) = match args.variant {
        CallVariant::ToolRead(call) => ("call_tool_read", call),
        CallVariant::ToolWrite(call) => ("call_tool_write", call),
        CallVariant::ToolDestructive(call) => ("call_tool_destructive", call),
    };
    let operation_type = match tool_name {
        "call_tool_read" => "read",
        "call_tool_write" => "write",
        _ => "destructive",
    };

    let call_args = match &call.args {
        Some(raw) => serde_json::from_str(raw).map_err(|e| invalid_args(raw, e))?,
        None => serde_json::Value::Object(Default::default()),
    };

    let mut intent = serde_json::json!({ "operation_type": operation_type });
    if let Some(reason) = &call.reason {
        intent["reason"] = serde_json::Value::String(reason.clone());
    }
    if let Some(sensitivity) = call.sensitivity {
        intent["data_sensitivity"] = serde_json::Value::String(sensitivity.as_str().to_string());
    }

    let arguments = serde_json::json!({
        "name": tool_name,
        "arguments": {
            "name": call.target,
            "args": call_args,
            "intent": intent,
        },
    });

    let request = Request::new("tools/call", Some(arguments), RequestId::Number(1));
    let dialer = dial(&config_path)?;
    let response = dialer.request("POST", "/mcp", Some(serde_json::to_value(&request).expect("Request always serializes"))).await?;

    if let Some(error) = response.get("error") {
        return Err(CliError::from_error_body(error));
    }
    let result = response.get("result").cloned().unwrap_or(serde_json::Value::Null);

    // `tools/call` reports rejected/failed invocations inside the result
    // body (`isError: true`, mcpproxy_server::protocol::McpSession::call_tool),
    // not as a JSON-RPC error — a blocked two-key validation is still a
    // successful RPC round-trip.
    let is_tool_error = result.get("isError").and_then(serde_json::Value::as_bool).unwrap_or(false);
    let text = result
        .get("content")
        .and_then(serde_json::Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("text"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");

    if is_tool_error {
        return Err(CliError::Remote { message: text.to_string(), request_id: None });
    }
    println!("{text}");
    Ok(())
}
