//! Shared application state threaded through every handler via axum's
//! `State` extractor. Everything inside is already reference-counted, so
//! `AppState` itself is cheap to clone per request.

use async_trait::async_trait;
use mcpproxy_core::domain::UpstreamServer;
use mcpproxy_core::error::ProxyResult;
use mcpproxy_index::ToolIndex;
use mcpproxy_server::Dispatcher;
use mcpproxy_storage::ActivityLog;
use mcpproxy_supervisor::Supervisor;
use std::sync::Arc;

/// `POST /api/v1/control/{start|stop|reload}` needs to
/// reach back into the daemon's own process lifecycle and on-disk config,
/// neither of which `mcpproxy-api` depends on. Broken the same way every
/// tray↔core cycle is broken: a callback trait injected at
/// construction rather than a back-reference.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn start(&self) -> ProxyResult<()>;
    async fn stop(&self) -> ProxyResult<()>;
    async fn reload(&self) -> ProxyResult<()>;
}

/// `POST /api/v1/config/import` needs
/// the per-source normalizers that live in `mcpproxy-daemon::config::import`
/// — same callback-injection pattern as
/// [`ControlPlane`].
pub trait ConfigImporter: Send + Sync {
    fn normalize(&self, source: &str, content: &str) -> ProxyResult<Vec<UpstreamServer>>;
}

/// What the daemon learned at bind time, returned verbatim by
/// `GET /api/v1/info`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub listen_addr: String,
    pub web_ui_url: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub dispatcher: Arc<Dispatcher>,
    pub activity: Arc<ActivityLog>,
    pub info: ServerInfo,
    /// `None` disables key enforcement outright; callers on a trusted
    /// socket/pipe transport also bypass the check regardless of
    /// this value.
    pub api_key: Option<String>,
    pub trusted_transport: bool,
    /// `None` until the daemon wires one up; handlers report
    /// `config_error` ("control plane not available") rather than panic.
    pub control: Option<Arc<dyn ControlPlane>>,
    pub importer: Option<Arc<dyn ConfigImporter>>,
}

impl AppState {
    pub fn index(&self) -> &Arc<ToolIndex> {
        self.supervisor.index()
    }
}
