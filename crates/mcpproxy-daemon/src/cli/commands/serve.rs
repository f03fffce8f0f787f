//! `mcpproxy serve`: the full daemon wiring.
//! Two modes:
//! - default: binds the REST/SSE surface on `listen_addr` *and* the
//! trusted Unix socket behind the same router,
//! plus the fixed OAuth loopback callback listener.
//! - `--stdio`: a single dedicated downstream session framed over this
//! process's own stdin/stdout, for agents that spawn `mcpproxy`
//! itself as a child the way Claude Desktop spawns any other MCP
//! server — no REST surface, since there is no second consumer to
//! share it with in that invocation shape.

use crate::cli::error::CliError;
use crate::config::{import::DaemonConfigImporter, Config};
use crate::{control::DaemonControlPlane, logging, oauth_callback, paths, shutdown, stdio_serve};
use clap::Args;
use mcpproxy_auth::flow::OAuthFlow;
use mcpproxy_core::error::{ErrorCode, ProxyError};
use mcpproxy_index::ToolIndex;
use mcpproxy_server::{Dispatcher, McpSession};
use mcpproxy_storage::Database;
use mcpproxy_supervisor::{events::EventBus, StorageTokenStore, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the config file's `listen_addr`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Serve the downstream MCP protocol over this process's stdio
    /// instead of binding any network listener.
    #[arg(long)]
    pub stdio: bool,
}

fn infra(code: ErrorCode, message: impl Into<String>) -> CliError {
    CliError::Proxy(ProxyError::infrastructure(code, message))
}

fn load_config(config_path: &Option<PathBuf>, listen_override: Option<String>) -> Result<(PathBuf, Config), CliError> {
    let path = config_path.clone().unwrap_or_else(paths::config_path);
    let mut config = Config::load(&path).map_err(|e| infra(ErrorCode::ConfigError, e.to_string()))?;
    if let Some(listen) = listen_override {
        config.listen_addr = listen;
    }
    config.validate().map_err(|e| infra(ErrorCode::ConfigError, e.to_string()))?;
    Ok((path, config))
}

pub async fn run(args: ServeArgs, config_path: Option<PathBuf>, verbosity: u8) -> Result<(), CliError> {
    paths::ensure_layout()?;
    let (config_path, config) = load_config(&config_path, args.listen)?;
    let _logging_guard = logging::init(&paths::logs_dir(), verbosity, config.logging.json)?;

    let db = Database::open(paths::database_path()).map_err(|e| infra(ErrorCode::DbLocked, e.to_string()))?;
    let activity = Arc::new(db.activity_log().map_err(|e| infra(ErrorCode::DbLocked, e.to_string()))?);
    let token_bucket = db.bucket("oauth_tokens").map_err(|e| infra(ErrorCode::DbLocked, e.to_string()))?;
    let token_store: Arc<dyn mcpproxy_auth::tokens::TokenStore> = Arc::new(StorageTokenStore::new(token_bucket));
    let oauth_flow = Arc::new(OAuthFlow::new(token_store.clone()).map_err(|e| infra(ErrorCode::InternalError, e.to_string()))?);
    let index = Arc::new(ToolIndex::in_memory().map_err(|e| infra(ErrorCode::InternalError, e.to_string()))?);

    let supervisor = Supervisor::new(index, token_store, oauth_flow, EventBus::new());
    supervisor.spawn_all(config.servers.clone());

    let dispatcher = Arc::new(
        Dispatcher::new(supervisor.clone(), activity.clone()).with_strict_server_validation(config.intent_declaration.strict_server_validation),
    );

    let root = CancellationToken::new();
    tokio::spawn(shutdown::wait_for_signal(root.clone()));

    if args.stdio {
        let session = Arc::new(McpSession::new(dispatcher));
        stdio_serve::run(session, root.clone()).await?;
        supervisor.shutdown_all().await;
        return Ok(());
    }

    run_networked(config_path, config, supervisor, dispatcher, activity, root).await
}

async fn run_networked(
    config_path: PathBuf,
    config: Config,
    supervisor: Supervisor,
    dispatcher: Arc<Dispatcher>,
    activity: Arc<mcpproxy_storage::ActivityLog>,
    root: CancellationToken,
) -> Result<(), CliError> {
    let control = Arc::new(DaemonControlPlane::new(supervisor.clone(), config_path));
    let importer = Arc::new(DaemonConfigImporter);

    let base_state = mcpproxy_api::AppState {
        supervisor: supervisor.clone(),
        dispatcher,
        activity,
        info: mcpproxy_api::ServerInfo { listen_addr: config.listen_addr.clone(), web_ui_url: None },
        api_key: config.api_key.clone(),
        trusted_transport: false,
        control: Some(control),
        importer: Some(importer),
    };

    let tcp_listener = tokio::net::TcpListener::bind(&config.listen_addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            infra(ErrorCode::PortConflict, format!("{} is already in use", config.listen_addr))
        } else if e.kind() == std::io::ErrorKind::PermissionDenied {
            infra(ErrorCode::PermissionDenied, e.to_string())
        } else {
            CliError::Io(e)
        }
    })?;

    let tcp_state = base_state.clone();
    let tcp_shutdown = root.clone();
    let tcp_task = tokio::spawn(async move {
        let app = mcpproxy_api::router(tcp_state);
        if let Err(e) = axum::serve(tcp_listener, app).with_graceful_shutdown(tcp_shutdown.cancelled_owned()).await {
            tracing::error!(error = %e, "tcp listener exited with error");
        }
    });

    let socket_path = paths::socket_path();
    let unix_state = mcpproxy_api::AppState { trusted_transport: true,..base_state };
    let unix_task = spawn_unix_listener(&socket_path, unix_state, root.clone())?;

    let callback_task = oauth_callback::spawn(supervisor.clone(), root.clone()).await?;
    let status_task = spawn_status_publisher(supervisor.clone(), root.clone());

    tracing::info!(listen_addr = %config.listen_addr, socket = %socket_path.display(), "mcpproxy serving");
    root.cancelled().await;

    supervisor.shutdown_all().await;
    shutdown::sweep_process_group(std::process::id() as i32);
    let _ = std::fs::remove_file(&socket_path);

    status_task.abort();
    let _ = tokio::join!(tcp_task, unix_task, callback_task);
    Ok(())
}

/// Periodic `status` SSE event: the
/// per-upstream `server_state` events already fire on every transition,
/// this is the steady heartbeat UI clients poll for a connected/total
/// summary even when nothing has changed.
const STATUS_PUBLISH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

fn spawn_status_publisher(supervisor: Supervisor, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(STATUS_PUBLISH_INTERVAL) => {
                    supervisor.publish_status_summary().await;
                }
            }
        }
    })
}

/// The trusted local transport. Only implemented on Unix — `npipe://`
/// dialing is a documented gap (`mcpproxy_transport::ipc::DialerError::NamedPipeUnsupported`)
/// and Windows builds simply don't expose the second, trust-bypassing
/// surface; the TCP listener (with API-key enforcement) still works
/// everywhere.
#[cfg(unix)]
fn spawn_unix_listener(
    socket_path: &std::path::Path,
    state: mcpproxy_api::AppState,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, CliError> {
    let _ = std::fs::remove_file(socket_path);
    let listener = tokio::net::UnixListener::bind(socket_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            infra(ErrorCode::PermissionDenied, e.to_string())
        } else {
            CliError::Io(e)
        }
    })?;
    Ok(tokio::spawn(async move {
        let app = mcpproxy_api::router(state);
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await {
            tracing::error!(error = %e, "unix listener exited with error");
        }
    }))
}

#[cfg(not(unix))]
fn spawn_unix_listener(
    _socket_path: &std::path::Path,
    _state: mcpproxy_api::AppState,
    _shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, CliError> {
    tracing::warn!("trusted local socket transport is only implemented on Unix; REST surface is only reachable over TCP on this platform");
    Ok(tokio::spawn(async {}))
}
