//! The HTTP/REST control-plane surface, its SSE event bus, and the
//! request-id middleware that tags every response.
//! [`router`] wires every endpoint behind the
//! request-id middleware (always first, so even a rejected request
//! carries `X-Request-Id`) and the API-key middleware (bypassed on a
//! trusted local transport).

pub mod error;
pub mod middleware;
pub mod routes;
pub mod sse;
pub mod state;

pub use state::{AppState, ServerInfo};

use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the full `axum::Router` for the daemon's REST + SSE surface.
/// The caller supplies `state` already populated with a live
/// [`mcpproxy_supervisor::Supervisor`], [`mcpproxy_server::Dispatcher`],
/// and activity log handle.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(routes::ready))
        .route("/api/v1/info", get(routes::info))
        .route("/api/v1/servers", get(routes::list_servers).post(routes::add_server))
        .route("/api/v1/servers/{name}", axum::routing::delete(routes::remove_server))
        .route("/api/v1/servers/{name}/enable", post(routes::enable_server))
        .route("/api/v1/servers/{name}/disable", post(routes::disable_server))
        .route("/api/v1/servers/{name}/restart", post(routes::restart_server))
        .route("/api/v1/servers/{name}/login", post(routes::login_server))
        .route("/api/v1/servers/{name}/quarantine", post(routes::quarantine_server))
        .route("/api/v1/servers/{name}/tools", get(routes::server_tools))
        .route("/api/v1/index/search", get(routes::search_index))
        .route("/api/v1/activity", get(routes::list_activity))
        .route("/api/v1/control/start", post(routes::control_start))
        .route("/api/v1/control/stop", post(routes::control_stop))
        .route("/api/v1/control/reload", post(routes::control_reload))
        .route("/api/v1/config/import", post(routes::config_import))
        .route("/mcp", post(routes::mcp_endpoint))
        .route("/events", get(sse::sse_handler))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::api_key))
        .route_layer(axum_middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
