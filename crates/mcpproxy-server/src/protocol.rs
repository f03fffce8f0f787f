//! Downstream-facing MCP session handling: the JSON-RPC methods an agent
//! sends directly to mcpproxy itself (as opposed to the REST control
//! plane in `mcpproxy-api`), transport-agnostic so both the stdio serve
//! loop and the HTTP `/mcp` endpoint in `mcpproxy-daemon` share one
//! implementation.
//! Mirrors the handshake shape of an upstream MCP server's own
//! `initialize` response, but with `tools.listChanged = false`: the
//! fixed four-tool catalogue never changes shape, and 
//! explicitly excludes forwarding `notifications/tools/list_changed`
//! downstream.

use crate::dispatch::{CallContext, Dispatcher};
use mcpproxy_protocol::jsonrpc::{Request, RequestId, Response};
use mcpproxy_protocol::{Error as ProtocolError, MCP_PROTOCOL_VERSION};
use serde_json::Value;
use std::sync::Arc;

/// A single downstream MCP session bound to one [`Dispatcher`]. Holds no
/// per-connection state beyond what the caller threads through
/// [`CallContext`] — `mcpproxy` doesn't need session affinity beyond the
/// `mcp_session_id` logged onto each activity record.
pub struct McpSession {
    dispatcher: Arc<Dispatcher>,
}

impl McpSession {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handles one JSON-RPC request and returns the response to send
    /// back, or `None` for a notification (no response expected).
    pub async fn handle(&self, request: Request, ctx: &CallContext) -> Option<Response> {
        let id = request.id.clone();
        if request.is_notification() {
            self.handle_notification(&request.method, request.params);
            return None;
        }
        let id = id.expect("non-notification request has an id");

        let result = match request.method.as_str() {
            "initialize" => Ok(initialize_result()),
            "tools/list" => Ok(self.list_tools_result()),
            "tools/call" => self.call_tool(request.params, ctx).await,
            other => Err(ProtocolError::method_not_found(other)),
        };

        Some(match result {
            Ok(value) => Response::success(id, value),
            Err(e) => Response::failure(id, e),
        })
    }

    fn handle_notification(&self, method: &str, _params: Option<Value>) {
        // "notifications/initialized" and similar lifecycle pings need no
        // action; mcpproxy doesn't forward tools/list_changed downstream
        // to its own clients, so there's nothing else to react to here.
        tracing::debug!(method, "ignoring downstream notification");
    }

    fn list_tools_result(&self) -> Value {
        serde_json::json!({ "tools": self.dispatcher.list_tools() })
    }

    async fn call_tool(&self, params: Option<Value>, ctx: &CallContext) -> Result<Value, ProtocolError> {
        let params = params.ok_or_else(|| ProtocolError::invalid_params("tools/call requires params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid_params("params.name is required"))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));

        match self.dispatcher.call(&name, arguments, ctx).await {
            Ok(value) => Ok(serde_json::json!({
                "content": [{ "type": "text", "text": value.to_string() }],
                "isError": false,
            })),
            Err(e) => Ok(serde_json::json!({
                "content": [{ "type": "text", "text": e.to_string() }],
                "isError": true,
            })),
        }
    }
}

/// `tools.listChanged = false`: the built-in catalogue is fixed, never
/// reactively updated.
fn initialize_result() -> Value {
    serde_json::json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "serverInfo": { "name": "mcpproxy", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": {
            "tools": { "listChanged": false },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpproxy_auth::flow::OAuthFlow;
    use mcpproxy_auth::tokens::{InMemoryTokenStore, TokenStore};
    use mcpproxy_index::ToolIndex;
    use mcpproxy_storage::Database;
    use mcpproxy_supervisor::events::EventBus;
    use mcpproxy_supervisor::Supervisor;

    fn session() -> McpSession {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let supervisor = Supervisor::new(Arc::new(ToolIndex::in_memory().unwrap()), store.clone(), Arc::new(OAuthFlow::new(store).unwrap()), EventBus::new());
        let db = Database::temporary().unwrap();
        McpSession::new(Arc::new(Dispatcher::new(supervisor, Arc::new(db.activity_log().unwrap()))))
    }

    #[tokio::test]
    async fn initialize_reports_no_list_changed_capability() {
        let session = session();
        let req = Request::new("initialize", Some(serde_json::json!({})), RequestId::Number(1));
        let resp = session.handle(req, &CallContext::default()).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn tools_list_returns_exactly_four_builtins() {
        let session = session();
        let req = Request::new("tools/list", None, RequestId::Number(2));
        let resp = session.handle(req, &CallContext::default()).await.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 4);
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let session = session();
        let req = Request::notification("notifications/initialized", None);
        assert!(session.handle(req, &CallContext::default()).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let session = session();
        let req = Request::new("bogus/method", None, RequestId::Number(3));
        let resp = session.handle(req, &CallContext::default()).await.unwrap();
        assert!(resp.error.is_some());
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let session = session();
        let req = Request::new("tools/call", Some(serde_json::json!({})), RequestId::Number(4));
        let resp = session.handle(req, &CallContext::default()).await.unwrap();
        assert!(resp.error.is_some());
        assert_eq!(resp.error.unwrap().code, -32602);
    }
}
