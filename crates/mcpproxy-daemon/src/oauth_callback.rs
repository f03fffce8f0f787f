//! The fixed loopback OAuth redirect listener:
//! `http://127.0.0.1:8765/oauth/callback`, matching the constant every
//! `UpstreamActor` builds its authorization URL against
//! (`mcpproxy_supervisor::actor::REDIRECT_URI`).
//! The redirect carries only `code`/`state`, not the upstream name, so
//! this handler asks each live upstream in turn whether the `state`
//! value belongs to it; the in-flight actor whose `pending_oauth.state`
//! matches accepts the code and the rest return `unauthenticated`
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use mcpproxy_supervisor::Supervisor;
use serde::Deserialize;
use std::net::SocketAddr;

pub const CALLBACK_ADDR: &str = "127.0.0.1:8765";
pub const CALLBACK_PATH: &str = "/oauth/callback";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: String,
    state: String,
}

async fn handle_callback(State(supervisor): State<Supervisor>, Query(params): Query<CallbackParams>) -> impl IntoResponse {
    for name in supervisor.server_names() {
        if supervisor
            .complete_oauth_callback(&name, params.code.clone(), params.state.clone())
            .await
            .is_ok()
        {
            tracing::info!(server = %name, "oauth authorization code accepted");
            return Html("<html><body>Authentication complete. You may close this window.</body></html>");
        }
    }
    tracing::warn!("oauth callback matched no in-flight authorization");
    Html("<html><body>Authentication failed: no matching authorization request.</body></html>")
}

/// Spawns the callback listener bound to the whole process's lifetime;
/// the caller cancels `shutdown` to stop it.
pub async fn spawn(supervisor: Supervisor, shutdown: tokio_util::sync::CancellationToken) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let app = axum::Router::new()
        .route(CALLBACK_PATH, axum::routing::get(handle_callback))
        .with_state(supervisor);

    let addr: SocketAddr = CALLBACK_ADDR.parse().expect("CALLBACK_ADDR is a valid socket address");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app).with_graceful_shutdown(async move { shutdown.cancelled().await }).await;
        if let Err(e) = result {
            tracing::error!(error = %e, "oauth callback listener exited with error");
        }
    }))
}
