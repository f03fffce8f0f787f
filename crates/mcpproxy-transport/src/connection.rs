//! `UpstreamConnection` — the core-layer capability set every transport
//! implements.

use async_trait::async_trait;
use mcpproxy_protocol::{Error as ProtocolError, Tool};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait ToolsChangedCallback: Send + Sync {
    /// Invoked exactly once per `notifications/tools/list_changed`
    /// received from the peer.
    async fn on_tools_changed(&self);
}

#[async_trait]
impl<F> ToolsChangedCallback for F
where
    F: Fn() + Send + Sync,
{
    async fn on_tools_changed(&self) {
        (self)()
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to start transport: {0}")]
    Startup(String),
    #[error("peer closed the connection")]
    Closed,
    #[error("timed out waiting for peer")]
    Timeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The core-layer capability set: `Initialize`, `ListTools`, `CallTool`,
/// `SubscribeToolsChanged`, `Close`.
#[async_trait]
pub trait UpstreamConnection: Send + Sync {
    /// Performs the MCP `initialize` handshake and returns the peer's
    /// advertised `capabilities` object.
    async fn initialize(&self, client_name: &str, client_version: &str) -> ConnectionResult<Value>;

    async fn list_tools(&self) -> ConnectionResult<Vec<Tool>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> ConnectionResult<Value>;

    /// Registers the callback invoked on `notifications/tools/list_changed`.
    /// A no-op for peers that never advertised the capability.
    async fn set_on_tools_changed(&self, callback: Arc<dyn ToolsChangedCallback>);

    async fn close(&self) -> ConnectionResult<()>;
}
