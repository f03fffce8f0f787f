//! HTTP / streamable-HTTP / SSE core-layer connection.
//! Each JSON-RPC call is POSTed to the base URL; when the peer responds
//! `text/event-stream` the body is read as SSE and the final `message`
//! event is parsed as the JSON-RPC response. A persistent SSE stream is
//! opened separately to receive server-initiated notifications
//! (`notifications/tools/list_changed`).

use async_trait::async_trait;
use futures::StreamExt;
use mcpproxy_protocol::jsonrpc::{Request, RequestId};
use mcpproxy_protocol::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use crate::connection::{ConnectionError, ConnectionResult, ToolsChangedCallback, UpstreamConnection};

#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    pub base_url: String,
    pub headers: HashMap<String, String>,
    pub bearer_token: Option<String>,
    pub request_timeout: std::time::Duration,
}

impl Default for StreamableHttpConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            headers: HashMap::new(),
            bearer_token: None,
            request_timeout: std::time::Duration::from_secs(15),
        }
    }
}

pub struct StreamableHttpConnection {
    client: reqwest::Client,
    config: StreamableHttpConfig,
    next_id: AtomicI64,
    session_id: TokioMutex<Option<String>>,
    on_tools_changed: TokioMutex<Option<Arc<dyn ToolsChangedCallback>>>,
}

impl StreamableHttpConnection {
    pub fn new(config: StreamableHttpConfig) -> ConnectionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConnectionError::Startup(e.to_string()))?;
        Ok(Self {
            client,
            config,
            next_id: AtomicI64::new(1),
            session_id: TokioMutex::new(None),
            on_tools_changed: TokioMutex::new(None),
        })
    }

    fn build_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream");
        for (k, v) in &self.config.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(token) = &self.config.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Returns `Err` carrying the `WWW-Authenticate` header value when
    /// the peer answers 401, so the managed layer can drive OAuth
    /// discovery.
    async fn post_rpc(&self, body: Value) -> ConnectionResult<Value> {
        let req = self.build_request(self.client.post(&self.config.base_url)).json(&body);
        let resp = req.send().await.map_err(|e| ConnectionError::Startup(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            let header = resp
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(ConnectionError::Startup(format!("401 WWW-Authenticate: {header}")));
        }
        if let Some(sid) = resp.headers().get("mcp-session-id").and_then(|v| v.to_str().ok()) {
            *self.session_id.lock().await = Some(sid.to_string());
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.contains("text/event-stream") {
            self.parse_sse_response(resp).await
        } else {
            resp.json::<Value>().await.map_err(|e| ConnectionError::Startup(e.to_string()))
        }
    }

    async fn parse_sse_response(&self, resp: reqwest::Response) -> ConnectionResult<Value> {
        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ConnectionError::Startup(e.to_string()))?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find("\n\n") {
                let event = buf[..pos].to_string();
                buf.drain(..pos + 2);
                if let Some(data_line) = event.lines().find(|l| l.starts_with("data:")) {
                    let data = data_line.trim_start_matches("data:").trim();
                    if let Ok(value) = serde_json::from_str::<Value>(data) {
                        return Ok(value);
                    }
                }
            }
        }
        Err(ConnectionError::Closed)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> ConnectionResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = Request::new(method, params, RequestId::Number(id));
        let body = serde_json::to_value(&req).map_err(|e| ConnectionError::Startup(e.to_string()))?;
        let value = self.post_rpc(body).await?;
        if let Some(err) = value.get("error") {
            let message = err.get("message").and_then(Value::as_str).unwrap_or("upstream error");
            return Err(ConnectionError::Startup(message.to_string()));
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Opens the server-initiated SSE stream and dispatches
    /// `notifications/tools/list_changed` to the registered callback.
    /// Spawned as a background task; errors are logged and the task
    /// exits (the managed layer's heartbeat detects the disconnect).
    pub fn spawn_notification_listener(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let endpoint = format!("{}/events", this.config.base_url.trim_end_matches('/'));
            let resp = match this.build_request(this.client.get(&endpoint)).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!(error = %e, "no server-initiated SSE stream available, relying on periodic re-discovery");
                    return;
                }
            };
            let mut stream = resp.bytes_stream();
            let mut buf = String::new();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find("\n\n") {
                    let event = buf[..pos].to_string();
                    buf.drain(..pos + 2);
                    if let Some(data_line) = event.lines().find(|l| l.starts_with("data:")) {
                        let data = data_line.trim_start_matches("data:").trim();
                        if let Ok(value) = serde_json::from_str::<Value>(data) {
                            if value.get("method").and_then(Value::as_str)
                                == Some(mcpproxy_protocol::notifications::TOOLS_LIST_CHANGED)
                            {
                                if let Some(cb) = this.on_tools_changed.lock().await.clone() {
                                    cb.on_tools_changed().await;
                                }
                            }
                        }
                    }
                }
            }
            warn!("upstream SSE notification stream closed");
        });
    }
}

#[async_trait]
impl UpstreamConnection for StreamableHttpConnection {
    async fn initialize(&self, client_name: &str, client_version: &str) -> ConnectionResult<Value> {
        let params = serde_json::json!({
            "protocolVersion": mcpproxy_protocol::MCP_PROTOCOL_VERSION,
            "clientInfo": { "name": client_name, "version": client_version },
            "capabilities": {},
        });
        let result = self.request("initialize", Some(params)).await?;
        Ok(result.get("capabilities").cloned().unwrap_or(Value::Null))
    }

    async fn list_tools(&self) -> ConnectionResult<Vec<Tool>> {
        let result = self.request("tools/list", None).await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools).map_err(|e| ConnectionError::Startup(e.to_string()))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ConnectionResult<Value> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.request("tools/call", Some(params)).await
    }

    async fn set_on_tools_changed(&self, callback: Arc<dyn ToolsChangedCallback>) {
        *self.on_tools_changed.lock().await = Some(callback);
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_json_rpc_and_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "tools": [] }
            })))
            .mount(&server)
            .await;

        let conn = StreamableHttpConnection::new(StreamableHttpConfig {
            base_url: format!("{}/mcp", server.uri()),
            ..Default::default()
        })
        .unwrap();

        let tools = conn.list_tools().await.unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn surfaces_www_authenticate_on_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("www-authenticate", "Bearer authorization_uri=\"http://127.0.0.1/authorize\""),
            )
            .mount(&server)
            .await;

        let conn = StreamableHttpConnection::new(StreamableHttpConfig {
            base_url: format!("{}/mcp", server.uri()),
            ..Default::default()
        })
        .unwrap();

        let err = conn.list_tools().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Startup(ref msg) if msg.contains("WWW-Authenticate")));
    }
}
