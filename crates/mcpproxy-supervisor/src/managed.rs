//! The managed layer's mailbox: every mutation of a `ManagedUpstream`
//! flows through its owning actor's inbox. `ActorHandle` is the cheap, cloneable front door other
//! crates use instead of touching actor internals.

use mcpproxy_core::domain::{ManagedUpstream, OAuthStatus, UpstreamServer};
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_protocol::Tool;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Commands an `ActorHandle` sends into its actor's mailbox. Variants
/// prefixed `Internal*` are only ever sent by the actor to itself (via a
/// cloned sender), never by an external caller.
pub enum ActorCommand {
    Enable,
    Disable,
    Restart,
    Quarantine,
    Unquarantine,
    Shutdown,
    UpdateConfig(UpstreamServer),
    ToolsChangedNotification,
    InternalReconnect,
    InternalPeriodicRediscover,
    TriggerOAuthLogin { reply: oneshot::Sender<ProxyResult<String>> },
    CompleteOAuthCallback { code: String, state: String, reply: oneshot::Sender<ProxyResult<()>> },
    GetOAuthStatus { reply: oneshot::Sender<OAuthStatus> },
    Status { reply: oneshot::Sender<ManagedUpstream> },
    ListTools { reply: oneshot::Sender<ProxyResult<Vec<Tool>>> },
    CallTool {
        tool_name: String,
        arguments: Value,
        reply: oneshot::Sender<ProxyResult<Value>>,
    },
}

/// Cheap, cloneable handle to one upstream's actor mailbox. This is the
/// façade layer the CLI, REST handlers, and MCP dispatcher use
#[derive(Clone)]
pub struct ActorHandle {
    name: String,
    tx: mpsc::Sender<ActorCommand>,
}

fn gone(name: &str) -> ProxyError {
    ProxyError::Internal(format!("upstream actor '{name}' is no longer running"))
}

impl ActorHandle {
    pub(crate) fn new(name: String, tx: mpsc::Sender<ActorCommand>) -> Self {
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<ActorCommand> {
        self.tx.clone()
    }

    async fn fire(&self, command: ActorCommand) -> ProxyResult<()> {
        self.tx.send(command).await.map_err(|_| gone(&self.name))
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ActorCommand) -> ProxyResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).await.map_err(|_| gone(&self.name))?;
        reply_rx.await.map_err(|_| gone(&self.name))
    }

    pub async fn enable(&self) -> ProxyResult<()> {
        self.fire(ActorCommand::Enable).await
    }

    pub async fn disable(&self) -> ProxyResult<()> {
        self.fire(ActorCommand::Disable).await
    }

    pub async fn restart(&self) -> ProxyResult<()> {
        self.fire(ActorCommand::Restart).await
    }

    pub async fn quarantine(&self) -> ProxyResult<()> {
        self.fire(ActorCommand::Quarantine).await
    }

    pub async fn unquarantine(&self) -> ProxyResult<()> {
        self.fire(ActorCommand::Unquarantine).await
    }

    pub async fn shutdown(&self) -> ProxyResult<()> {
        self.fire(ActorCommand::Shutdown).await
    }

    pub async fn update_config(&self, config: UpstreamServer) -> ProxyResult<()> {
        self.fire(ActorCommand::UpdateConfig(config)).await
    }

    pub async fn trigger_oauth_login(&self) -> ProxyResult<String> {
        self.ask(|reply| ActorCommand::TriggerOAuthLogin { reply }).await?
    }

    pub async fn complete_oauth_callback(&self, code: String, state: String) -> ProxyResult<()> {
        self.ask(|reply| ActorCommand::CompleteOAuthCallback { code, state, reply }).await?
    }

    pub async fn oauth_status(&self) -> ProxyResult<OAuthStatus> {
        self.ask(|reply| ActorCommand::GetOAuthStatus { reply }).await
    }

    pub async fn status(&self) -> ProxyResult<ManagedUpstream> {
        self.ask(|reply| ActorCommand::Status { reply }).await
    }

    pub async fn list_tools(&self) -> ProxyResult<Vec<Tool>> {
        self.ask(|reply| ActorCommand::ListTools { reply }).await?
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> ProxyResult<Value> {
        self.ask(|reply| ActorCommand::CallTool {
            tool_name: tool_name.to_string(),
            arguments,
            reply,
        })
        .await?
    }
}

/// Validates `name` against the upstream registry before routing, so
/// callers get `server_not_found` rather than an opaque channel error.
pub fn require_known(name: &str, known: bool) -> ProxyResult<()> {
    if known {
        Ok(())
    } else {
        Err(ProxyError::NotFound {
            code: ErrorCode::ServerNotFound,
            message: format!("no such upstream server: {name}"),
        })
    }
}
