//! Routes a built-in tool call to its implementation: `retrieve_tools`
//! searches the index; the three `call_tool_*` variants validate intent
//! (`crate::intent`) and forward to the `Supervisor`.
//! Every `call_tool_*` invocation is recorded to the activity log
//! regardless of outcome.

use crate::builtin;
use crate::intent;
use mcpproxy_core::activity::{ActivityRecord, ActivityStatus, ActivityType};
use mcpproxy_core::domain::ToolDocument;
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_protocol::Tool;
use mcpproxy_storage::ActivityLog;
use mcpproxy_supervisor::Supervisor;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::warn;

/// Per-request metadata threaded through to the activity log, supplied
/// by whichever transport (MCP stdio/HTTP dispatch, REST) accepted the
/// call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub request_id: String,
    pub mcp_session_id: Option<String>,
    pub mcp_client_name: Option<String>,
    pub mcp_client_version: Option<String>,
}

pub struct Dispatcher {
    supervisor: Supervisor,
    activity: Arc<ActivityLog>,
    /// `intent_declaration.strict_server_validation` from the config
    /// file, default `true`.
    strict_server_validation: bool,
}

impl Dispatcher {
    pub fn new(supervisor: Supervisor, activity: Arc<ActivityLog>) -> Self {
        Self { supervisor, activity, strict_server_validation: true }
    }

    pub fn with_strict_server_validation(mut self, strict: bool) -> Self {
        self.strict_server_validation = strict;
        self
    }

    /// The fixed four-tool catalogue every MCP client sees
    pub fn list_tools(&self) -> Vec<Tool> {
        builtin::all()
    }

    pub async fn call(&self, tool_name: &str, arguments: Value, ctx: &CallContext) -> ProxyResult<Value> {
        match tool_name {
            "retrieve_tools" => self.retrieve_tools(&arguments),
            "call_tool_read" | "call_tool_write" | "call_tool_destructive" => {
                self.call_tool(tool_name, arguments, ctx).await
            }
            other => Err(ProxyError::NotFound {
                code: ErrorCode::EndpointNotFound,
                message: format!("no such built-in tool: {other}"),
            }),
        }
    }

    /// `retrieve_tools(query, limit?)`: caps `limit` at 50 (default 10).
    /// `name` in each hit is the qualified `server:tool` identifier,
    /// `call_with` the recommended built-in variant.
    fn retrieve_tools(&self, arguments: &Value) -> ProxyResult<Value> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ProxyError::validation(ErrorCode::InvalidArgument, "query is required"))?;
        let limit = arguments.get("limit").and_then(Value::as_u64).unwrap_or(10).clamp(1, 50) as usize;

        let hits = self.supervisor.search_tools(query, limit)?;

        let results: Vec<Value> = hits
            .into_iter()
            .map(|hit| {
                serde_json::json!({
                    "name": hit.doc.qualified_name,
                    "description": hit.doc.description,
                    "inputSchema": hit.doc.input_schema,
                    "score": hit.score,
                    "server": hit.doc.server,
                    "annotations": hit.doc.annotations,
                    "call_with": hit.doc.recommended_call_with(),
                })
            })
            .collect();
        Ok(serde_json::json!({ "results": results }))
    }

    async fn call_tool(&self, variant: &str, arguments: Value, ctx: &CallContext) -> ProxyResult<Value> {
        let started = Instant::now();
        let result = self.call_tool_inner(variant, &arguments).await;
        self.record(variant, &arguments, &result, ctx, started.elapsed());
        result
    }

    async fn call_tool_inner(&self, variant: &str, arguments: &Value) -> ProxyResult<Value> {
        let qualified_name = arguments
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProxyError::validation(ErrorCode::InvalidArgument, "name is required"))?;
        let tool_arguments = parse_call_arguments(arguments)?;

        let (server, tool_name) = ToolDocument::split_qualified(qualified_name).ok_or_else(|| {
            ProxyError::validation(ErrorCode::InvalidArgument, "name must be of the form 'server:tool'")
        })?;

        let doc = self
            .supervisor
            .index()
            .get(qualified_name)
            .map_err(|e| ProxyError::infrastructure(ErrorCode::InternalError, e.to_string()))?
            .ok_or_else(|| ProxyError::tool_not_found(qualified_name))?;

        intent::validate(variant, &doc, arguments, self.strict_server_validation)?;

        self.supervisor.call_tool(server, tool_name, tool_arguments).await
    }

    fn record(&self, variant: &str, arguments: &Value, result: &ProxyResult<Value>, ctx: &CallContext, elapsed: std::time::Duration) {
        let qualified_name = arguments.get("name").and_then(Value::as_str);
        let (server_name, tool_name) = match qualified_name.and_then(ToolDocument::split_qualified) {
            Some((s, t)) => (Some(s.to_string()), Some(t.to_string())),
            None => (None, None),
        };

        let status = match result {
            Ok(_) => ActivityStatus::Success,
            Err(ProxyError::Validation {.. }) => ActivityStatus::Blocked,
            Err(_) => ActivityStatus::Error,
        };

        let intent_raw = arguments.get("intent");
        let metadata = serde_json::json!({
            "tool_variant": variant,
            "qualifiedName": qualified_name,
            "intent": {
                "operation_type": intent_raw.and_then(|i| i.get("operation_type")),
                "data_sensitivity": intent_raw.and_then(|i| i.get("data_sensitivity")),
                "reason": intent_raw.and_then(|i| i.get("reason")),
            },
            "error": result.as_ref().err().map(|e| e.to_string()),
        });

        let record = ActivityRecord {
            id: 0,
            timestamp: SystemTime::now(),
            kind: ActivityType::ToolCall,
            server_name,
            tool_name,
            status,
            duration_ms: elapsed.as_millis() as u64,
            mcp_session_id: ctx.mcp_session_id.clone(),
            mcp_client_name: ctx.mcp_client_name.clone(),
            mcp_client_version: ctx.mcp_client_version.clone(),
            parent_call_id: None,
            request_id: ctx.request_id.clone(),
            metadata,
        };

        if let Err(e) = self.activity.append(record) {
            warn!(error = %e, "failed to append activity record");
        }
    }
}

/// `args` and `args_json` are mutually exclusive; neither
/// is required, so absence of both just means an empty arguments object.
fn parse_call_arguments(arguments: &Value) -> ProxyResult<Value> {
    let args = arguments.get("args");
    let args_json = arguments.get("args_json");
    match (args, args_json) {
        (Some(_), Some(_)) => Err(ProxyError::validation(ErrorCode::InvalidArgument, "args and args_json are mutually exclusive")),
        (Some(v), None) => Ok(v.clone()),
        (None, Some(raw)) => {
            let raw = raw
                .as_str()
                .ok_or_else(|| ProxyError::validation(ErrorCode::InvalidArgument, "args_json must be a string"))?;
            serde_json::from_str(raw).map_err(|e| ProxyError::validation(ErrorCode::InvalidArgument, format!("args_json is not valid JSON: {e}")))
        }
        (None, None) => Ok(Value::Object(Default::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpproxy_auth::flow::OAuthFlow;
    use mcpproxy_auth::tokens::{InMemoryTokenStore, TokenStore};
    use mcpproxy_core::activity::ActivityFilter;
    use mcpproxy_core::domain::{UpstreamEndpoint, UpstreamProtocol, UpstreamServer};
    use mcpproxy_index::ToolIndex;
    use mcpproxy_storage::Database;
    use mcpproxy_supervisor::events::EventBus;
    use std::collections::HashMap;

    fn dispatcher_with(index: Arc<ToolIndex>) -> Dispatcher {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let supervisor = Supervisor::new(index, store.clone(), Arc::new(OAuthFlow::new(store).unwrap()), EventBus::new());
        let db = Database::temporary().unwrap();
        Dispatcher::new(supervisor, Arc::new(db.activity_log().unwrap()))
    }

    fn quarantined_server(name: &str) -> UpstreamServer {
        UpstreamServer {
            name: name.to_string(),
            protocol: UpstreamProtocol::StreamableHttp,
            endpoint: UpstreamEndpoint::Url { url: "http://127.0.0.1:1/mcp".into() },
            enabled: false,
            quarantined: true,
            isolation: None,
            oauth: None,
            tool_annotations: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn retrieve_tools_returns_empty_results_on_empty_index() {
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        let dispatcher = dispatcher_with(index);
        let out = dispatcher
            .call("retrieve_tools", serde_json::json!({ "query": "anything" }), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(out["results"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn call_tool_rejects_unknown_qualified_name() {
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        let dispatcher = dispatcher_with(index);
        let args = serde_json::json!({
            "name": "github:delete_repo",
            "args": {},
            "intent": { "operation_type": "destructive" }
        });
        let err = dispatcher.call("call_tool_destructive", args, &CallContext::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ToolNotFound);
    }

    #[tokio::test]
    async fn blocked_call_is_still_recorded_to_activity_log() {
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        index
            .apply_diff(
                "github",
                &[mcpproxy_protocol::Tool {
                    name: "delete_repo".into(),
                    description: Some("delete a repo".into()),
                    input_schema: Default::default(),
                    annotations: Some(mcpproxy_protocol::ToolAnnotations {
                        destructive_hint: Some(true),
                        ..Default::default()
                    }),
                }],
            )
            .unwrap();
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let supervisor = Supervisor::new(index, store.clone(), Arc::new(OAuthFlow::new(store).unwrap()), EventBus::new());
        supervisor.spawn_all(vec![quarantined_server("github")]);
        let db = Database::temporary().unwrap();
        let activity = Arc::new(db.activity_log().unwrap());
        let dispatcher = Dispatcher::new(supervisor, activity.clone());

        let args = serde_json::json!({
            "name": "github:delete_repo",
            "args": {},
            "intent": { "operation_type": "write" }
        });
        let err = dispatcher
            .call("call_tool_write", args, &CallContext { request_id: "req-1".into(),..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerMismatch);

        let (records, _) = activity.query(&ActivityFilter::default(), 10, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ActivityStatus::Blocked);
    }

    #[tokio::test]
    async fn args_and_args_json_are_mutually_exclusive() {
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        let dispatcher = dispatcher_with(index);
        let args = serde_json::json!({
            "name": "github:delete_repo",
            "args": {},
            "args_json": "{}",
            "intent": { "operation_type": "destructive" }
        });
        let err = dispatcher.call("call_tool_destructive", args, &CallContext::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn args_json_is_parsed_as_json() {
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        index
            .apply_diff(
                "github",
                &[mcpproxy_protocol::Tool {
                    name: "list_repos".into(),
                    description: Some("list repos".into()),
                    input_schema: Default::default(),
                    annotations: Some(mcpproxy_protocol::ToolAnnotations { read_only_hint: Some(true),..Default::default() }),
                }],
            )
            .unwrap();
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let supervisor = Supervisor::new(index, store.clone(), Arc::new(OAuthFlow::new(store).unwrap()), EventBus::new());
        supervisor.spawn_all(vec![quarantined_server("github")]);
        let db = Database::temporary().unwrap();
        let dispatcher = Dispatcher::new(supervisor, Arc::new(db.activity_log().unwrap()));

        let args = serde_json::json!({
            "name": "github:list_repos",
            "args_json": "{\"org\": \"acme\"}",
            "intent": { "operation_type": "read" }
        });
        // The upstream itself isn't reachable (quarantined), but reaching
        // the "upstream call" step at all proves args_json parsed and the
        // intent/server-annotation checks passed.
        let err = dispatcher.call("call_tool_read", args, &CallContext::default()).await.unwrap_err();
        assert_ne!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn retrieve_tools_response_matches_external_interface_shape() {
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        index
            .apply_diff(
                "github",
                &[mcpproxy_protocol::Tool {
                    name: "delete_repo".into(),
                    description: Some("delete a repo".into()),
                    input_schema: Default::default(),
                    annotations: Some(mcpproxy_protocol::ToolAnnotations { destructive_hint: Some(true),..Default::default() }),
                }],
            )
            .unwrap();
        let dispatcher = dispatcher_with(index);
        let out = dispatcher
            .call("retrieve_tools", serde_json::json!({ "query": "delete" }), &CallContext::default())
            .await
            .unwrap();
        let hit = &out["results"][0];
        assert_eq!(hit["name"], "github:delete_repo");
        assert_eq!(hit["server"], "github");
        assert_eq!(hit["call_with"], "call_tool_destructive");
        assert!(hit["annotations"].is_object());
        assert!(hit["inputSchema"].is_object() || hit["inputSchema"].is_null());
    }
}
