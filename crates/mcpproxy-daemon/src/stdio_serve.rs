//! Downstream stdio serve loop: when an agent launches `mcpproxy` itself
//! as a child process (the common pattern for desktop MCP clients) rather
//! than dialing the HTTP `/mcp` endpoint, this reads newline-delimited
//! JSON-RPC requests from stdin and writes responses to stdout, reusing
//! the same [`McpSession`] the HTTP endpoint uses
//! (`mcpproxy_server::protocol`).
//! Framing mirrors `mcpproxy_transport::stdio`'s upstream-facing reader:
//! one JSON value per line, notifications produce no output line.

use mcpproxy_protocol::jsonrpc::Request;
use mcpproxy_server::{CallContext, McpSession};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

pub async fn run(session: Arc<McpSession>, shutdown: tokio_util::sync::CancellationToken) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let mcp_session_id = Uuid::new_v4().to_string();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "malformed downstream JSON-RPC line, ignoring");
                continue;
            }
        };

        let ctx = CallContext {
            request_id: Uuid::new_v4().to_string(),
            mcp_session_id: Some(mcp_session_id.clone()),
            mcp_client_name: None,
            mcp_client_version: None,
        };
        if let Some(response) = session.handle(request, &ctx).await {
            let mut out = serde_json::to_string(&response).expect("Response always serializes");
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
