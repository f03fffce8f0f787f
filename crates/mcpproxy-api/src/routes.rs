//! Handlers for every endpoint `lib.rs::router` wires up. Each extracts the
//! request-scoped [`RequestContext`] the request-id middleware stashed in
//! the request extensions, and turns a `ProxyError` into an [`ApiError`]
//! carrying that context's `request_id`.

use crate::error::{ok, ApiError};
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use mcpproxy_core::activity::{ActivityFilter, ActivityStatus, ActivityType};
use mcpproxy_core::context::RequestContext;
use mcpproxy_core::domain::UpstreamServer;
use mcpproxy_core::error::{ErrorCode, ProxyError};
use mcpproxy_protocol::jsonrpc::Request as RpcRequest;
use mcpproxy_server::{CallContext, McpSession};
use mcpproxy_storage::ActivityCursor;
use serde::Deserialize;

fn err(e: ProxyError, ctx: &RequestContext) -> ApiError {
    ApiError::new(e, ctx.request_id.clone())
}

/// `GET /ready` — liveness only; no upstream or storage access.
pub async fn ready() -> impl IntoResponse {
    "ok"
}

pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    ok(serde_json::json!({
        "listen_addr": state.info.listen_addr,
        "web_ui_url": state.info.web_ui_url,
    }))
}

pub async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.supervisor.status_all().await)
}

pub async fn add_server(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(server): Json<UpstreamServer>,
) -> Result<impl IntoResponse, ApiError> {
    server
        .validate()
        .map_err(|e| err(ProxyError::validation(ErrorCode::ConfigError, e.to_string()), &ctx))?;

    let mut configs: Vec<UpstreamServer> = state.supervisor.status_all().await.into_iter().map(|m| m.config).collect();
    if configs.iter().any(|c| c.name == server.name) {
        return Err(err(
            ProxyError::validation(ErrorCode::ConfigError, format!("upstream '{}' already exists", server.name)),
            &ctx,
        ));
    }
    configs.push(server);
    state.supervisor.reload_config(configs).await;
    Ok(ok(serde_json::json!({ "added": true })))
}

pub async fn remove_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let configs: Vec<UpstreamServer> = state.supervisor.status_all().await.into_iter().map(|m| m.config).collect();
    if !configs.iter().any(|c| c.name == name) {
        return Err(err(ProxyError::server_not_found(name.clone()), &ctx));
    }
    let remaining: Vec<UpstreamServer> = configs.into_iter().filter(|c| c.name != name).collect();
    state.supervisor.reload_config(remaining).await;
    Ok(ok(serde_json::json!({ "removed": true })))
}

pub async fn enable_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.enable(&name).await.map_err(|e| err(e, &ctx))?;
    Ok(ok(serde_json::json!({ "enabled": true })))
}

pub async fn disable_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.disable(&name).await.map_err(|e| err(e, &ctx))?;
    Ok(ok(serde_json::json!({ "disabled": true })))
}

pub async fn restart_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.restart(&name).await.map_err(|e| err(e, &ctx))?;
    Ok(ok(serde_json::json!({ "restarted": true })))
}

/// `trigger_oauth_login` returns the authorization URL the caller should
/// open; the response also carries `correlation_id` since this is an
/// OAuth-related endpoint.
pub async fn login_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let url = state.supervisor.trigger_oauth_login(&name).await.map_err(|e| err(e, &ctx))?;
    let correlation = mcpproxy_core::context::OAuthCorrelation::new();
    Ok(ok(serde_json::json!({
        "authorization_url": url,
        "correlation_id": correlation.correlation_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct QuarantineBody {
    /// Defaults to `true`: the bare `POST.../quarantine` action
    /// quarantines. Pass `{"quarantined": false}` to lift it — the REST
    /// surface is authoritative over quarantine state.
    #[serde(default = "default_true")]
    quarantined: bool,
}

fn default_true() -> bool {
    true
}

pub async fn quarantine_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let quarantined = if body.is_empty() {
        true
    } else {
        serde_json::from_slice::<QuarantineBody>(&body).map(|b| b.quarantined).unwrap_or(true)
    };
    if quarantined {
        state.supervisor.quarantine(&name).await.map_err(|e| err(e, &ctx))?;
    } else {
        state.supervisor.unquarantine(&name).await.map_err(|e| err(e, &ctx))?;
    }
    Ok(ok(serde_json::json!({ "quarantined": quarantined })))
}

pub async fn server_tools(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let tools = state.supervisor.list_tools(&name).await.map_err(|e| err(e, &ctx))?;
    Ok(ok(tools))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: String,
    limit: Option<usize>,
}

pub async fn search_index(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let hits = state.supervisor.search_tools(&params.q, limit).map_err(|e| err(e, &ctx))?;
    Ok(ok(hits))
}

/// Query params for `GET /api/v1/activity`; the filter set mirrors every
/// field on [`ActivityFilter`].
#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    server_name: Option<String>,
    tool_name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<ActivityType>,
    status: Option<ActivityStatus>,
    intent_type: Option<String>,
    request_id: Option<String>,
    /// RFC 3339 timestamps; invalid values are a `400 invalid_argument`
    /// rather than a silently ignored filter.
    since: Option<String>,
    until: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

fn parse_timestamp(raw: &str, ctx: &RequestContext) -> Result<std::time::SystemTime, ApiError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| std::time::SystemTime::from(dt.with_timezone(&chrono::Utc)))
        .map_err(|e| err(ProxyError::validation(ErrorCode::InvalidArgument, format!("not a valid RFC 3339 timestamp: {e}")), ctx))
}

pub async fn list_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityParams>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let since = params.since.as_deref().map(|s| parse_timestamp(s, &ctx)).transpose()?;
    let until = params.until.as_deref().map(|s| parse_timestamp(s, &ctx)).transpose()?;
    let filter = ActivityFilter {
        server_name: params.server_name,
        tool_name: params.tool_name,
        kind: params.kind,
        status: params.status,
        intent_type: params.intent_type,
        request_id: params.request_id,
        since,
        until,
    };
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let cursor = params.cursor.as_deref().and_then(ActivityCursor::parse);

    let (records, next_cursor) = state
        .activity
        .query(&filter, limit, cursor)
        .map_err(|e| err(ProxyError::infrastructure(ErrorCode::InternalError, e.to_string()), &ctx))?;

    Ok(ok(serde_json::json!({
        "records": records,
        "next_cursor": next_cursor.map(ActivityCursor::encode),
    })))
}

fn control_plane_missing(ctx: &RequestContext) -> ApiError {
    err(
        ProxyError::infrastructure(ErrorCode::ConfigError, "control plane is not wired up"),
        ctx,
    )
}

pub async fn control_start(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> Result<impl IntoResponse, ApiError> {
    match &state.control {
        Some(control) => {
            control.start().await.map_err(|e| err(e, &ctx))?;
            Ok(ok(serde_json::json!({ "started": true })))
        }
        None => Err(control_plane_missing(&ctx)),
    }
}

pub async fn control_stop(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> Result<impl IntoResponse, ApiError> {
    match &state.control {
        Some(control) => {
            control.stop().await.map_err(|e| err(e, &ctx))?;
            Ok(ok(serde_json::json!({ "stopped": true })))
        }
        None => Err(control_plane_missing(&ctx)),
    }
}

pub async fn control_reload(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> Result<impl IntoResponse, ApiError> {
    match &state.control {
        Some(control) => {
            control.reload().await.map_err(|e| err(e, &ctx))?;
            Ok(ok(serde_json::json!({ "reloaded": true })))
        }
        None => Err(control_plane_missing(&ctx)),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigImportBody {
    /// One of `claude-desktop`, `claude-code`, `cursor`, `codex-toml`,
    /// `gemini-cli`.
    source: String,
    content: String,
    /// `false` (default) returns a preview without touching live config;
    /// `true` merges the normalized servers in via `reload_config`.
    #[serde(default)]
    commit: bool,
}

pub async fn config_import(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ConfigImportBody>,
) -> Result<impl IntoResponse, ApiError> {
    let importer = state
        .importer
        .as_ref()
        .ok_or_else(|| err(ProxyError::infrastructure(ErrorCode::ConfigError, "no config importer wired up"), &ctx))?;
    let imported = importer.normalize(&body.source, &body.content).map_err(|e| err(e, &ctx))?;

    if body.commit {
        let mut configs: Vec<UpstreamServer> = state.supervisor.status_all().await.into_iter().map(|m| m.config).collect();
        for server in &imported {
            configs.retain(|c| c.name != server.name);
        }
        configs.extend(imported.iter().cloned());
        state.supervisor.reload_config(configs).await;
    }

    Ok(ok(serde_json::json!({ "servers": imported, "committed": body.commit })))
}

/// `POST /mcp` — the downstream MCP JSON-RPC endpoint itself, distinct
/// from the REST control plane: an agent speaking MCP over streamable
/// HTTP posts one JSON-RPC envelope per request and gets one envelope
/// (or `202 Accepted` with an empty body for a notification) back.
pub async fn mcp_endpoint(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<RpcRequest>,
) -> impl IntoResponse {
    let session = McpSession::new(state.dispatcher.clone());
    let call_ctx = CallContext {
        request_id: ctx.request_id.clone(),
        mcp_session_id: None,
        mcp_client_name: None,
        mcp_client_version: None,
    };
    match session.handle(request, &call_ctx).await {
        Some(response) => Json(response).into_response(),
        None => axum::http::StatusCode::ACCEPTED.into_response(),
    }
}
