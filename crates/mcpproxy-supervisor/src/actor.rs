//! `UpstreamActor`: the single owner of one upstream's mutable runtime
//! state. Every mutation —
//! connect, discover, backoff, OAuth, admin commands — runs inside
//! `run()`'s command loop; nothing outside this module ever touches
//! `ManagedUpstream` directly.

use crate::events::{EventBus, ServerStateEvent, ToolIndexUpdateEvent};
use crate::managed::{ActorCommand, ActorHandle};
use async_trait::async_trait;
use mcpproxy_auth::discovery::AuthorizationServerMetadata;
use mcpproxy_auth::flow::{AuthorizationPrompt, OAuthFlow, OAuthFlowError};
use mcpproxy_auth::tokens::TokenStore;
use mcpproxy_client::client::{Client, ClientError};
use mcpproxy_client::connect::{build_connection, BuildError};
use mcpproxy_core::domain::{
    backoff_delay, AdminState, Health, ManagedUpstream, OAuthStatus, UpstreamEndpoint, UpstreamServer, UpstreamState,
};
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_index::ToolIndex;
use mcpproxy_transport::connection::{ConnectionError, ToolsChangedCallback};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const MAILBOX_CAPACITY: usize = 64;

/// Loopback redirect mcpproxy listens on for the authorization-code
/// grant. Fixed rather than configurable: every upstream's OAuth client
/// registration (DCR or static) must allowlist this exact value.
const REDIRECT_URI: &str = "http://127.0.0.1:8765/oauth/callback";

struct PendingOAuth {
    metadata: AuthorizationServerMetadata,
    client_id: String,
    verifier: String,
    state: String,
    redirect_uri: String,
}

struct NotifyOnToolsChanged(mpsc::Sender<ActorCommand>);

#[async_trait]
impl ToolsChangedCallback for NotifyOnToolsChanged {
    async fn on_tools_changed(&self) {
        let _ = self.0.send(ActorCommand::ToolsChangedNotification).await;
    }
}

/// Owns one `ManagedUpstream`'s state and the one live connection it may
/// hold. Spawned onto its own task by [`spawn`]; all external access goes
/// through the returned [`ActorHandle`].
pub struct UpstreamActor {
    state: ManagedUpstream,
    client: Option<Client>,
    index: Arc<ToolIndex>,
    token_store: Arc<dyn TokenStore>,
    oauth_flow: Arc<OAuthFlow>,
    event_bus: EventBus,
    in_flight_discovery: Arc<AtomicBool>,
    pending_oauth: Option<PendingOAuth>,
    /// Periodic re-discovery timer, armed on connect only for peers that
    /// didn't advertise `capabilities.tools.listChanged`; aborted on
    /// every disconnect so a stale timer from a previous connection never
    /// fires into a new one.
    periodic_rediscover: Option<tokio::task::JoinHandle<()>>,
    tx: mpsc::Sender<ActorCommand>,
    rx: mpsc::Receiver<ActorCommand>,
}

/// peers lacking `capabilities.tools.listChanged` fall back to a
/// 5-minute periodic re-discovery.
const PERIODIC_REDISCOVER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Spawns an actor for `config` and returns the handle callers use to
/// drive it. The actor attempts its first connect immediately if the
/// upstream is enabled and not quarantined.
pub fn spawn(
    config: UpstreamServer,
    index: Arc<ToolIndex>,
    token_store: Arc<dyn TokenStore>,
    oauth_flow: Arc<OAuthFlow>,
    event_bus: EventBus,
) -> ActorHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let name = config.name.clone();
    let handle = ActorHandle::new(name, tx.clone());
    let actor = UpstreamActor {
        state: ManagedUpstream::new(config),
        client: None,
        index,
        token_store,
        oauth_flow,
        event_bus,
        in_flight_discovery: Arc::new(AtomicBool::new(false)),
        pending_oauth: None,
        periodic_rediscover: None,
        tx,
        rx,
    };
    tokio::spawn(actor.run());
    handle
}

impl UpstreamActor {
    fn name(&self) -> String {
        self.state.config.name.clone()
    }

    fn publish_state(&self) {
        self.event_bus.publish_server_state(ServerStateEvent {
            server: self.name(),
            state: self.state.state,
            health: self.state.health.clone(),
        });
    }

    pub async fn run(mut self) {
        if self.state.config.enabled && !self.state.config.quarantined {
            self.connect().await;
        }
        while let Some(command) = self.rx.recv().await {
            if self.handle(command).await.is_break() {
                break;
            }
        }
        debug!(server = %self.name(), "upstream actor exiting");
    }

    async fn handle(&mut self, command: ActorCommand) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow::{Break, Continue};
        match command {
            ActorCommand::Enable => {
                self.state.config.enabled = true;
                self.state.health.admin_state = AdminState::Enabled;
                if !self.state.config.quarantined {
                    self.connect().await;
                } else {
                    self.publish_state();
                }
            }
            ActorCommand::Disable => {
                self.disconnect("disabled by operator").await;
                self.state.config.enabled = false;
                self.state.state = UpstreamState::Disconnected;
                self.state.health = Health::unhealthy("disabled", "administratively disabled");
                self.state.health.admin_state = AdminState::Disabled;
                self.publish_state();
            }
            ActorCommand::Restart => {
                self.disconnect("restart requested").await;
                self.connect().await;
            }
            ActorCommand::Quarantine => {
                self.disconnect("quarantined").await;
                self.state.config.quarantined = true;
                self.state.state = UpstreamState::Quarantined;
                self.state.health = Health::quarantined();
                self.publish_state();
            }
            ActorCommand::Unquarantine => {
                self.state.config.quarantined = false;
                if self.state.config.enabled {
                    self.connect().await;
                } else {
                    self.state.health = Health::unhealthy("disabled", "administratively disabled");
                    self.publish_state();
                }
            }
            ActorCommand::Shutdown => {
                self.disconnect("shutdown").await;
                self.state.state = UpstreamState::Shutdown;
                self.publish_state();
                return Break(());
            }
            ActorCommand::UpdateConfig(new_config) => {
                self.disconnect("configuration changed").await;
                self.state = ManagedUpstream::new(new_config);
                if self.state.config.enabled && !self.state.config.quarantined {
                    self.connect().await;
                } else {
                    self.publish_state();
                }
            }
            ActorCommand::ToolsChangedNotification => {
                self.discover().await;
            }
            ActorCommand::InternalReconnect => {
                if self.state.state == UpstreamState::Backoff {
                    self.connect().await;
                }
            }
            ActorCommand::InternalPeriodicRediscover => {
                self.discover().await;
            }
            ActorCommand::TriggerOAuthLogin { reply } => {
                let outcome = self.begin_oauth_login().await;
                let _ = reply.send(outcome);
            }
            ActorCommand::CompleteOAuthCallback { code, state, reply } => {
                let outcome = self.complete_oauth_login(code, state).await;
                let _ = reply.send(outcome);
            }
            ActorCommand::GetOAuthStatus { reply } => {
                let status = match self.token_store.load(&self.name()).await {
                    Ok(Some(tokens)) => OAuthStatus {
                        authenticated: !tokens.is_expired(chrono::Duration::zero()),
                        expires_at: Some(tokens.expires_at.into()),
                    },
                    _ => self.state.oauth_status.clone(),
                };
                let _ = reply.send(status);
            }
            ActorCommand::Status { reply } => {
                let _ = reply.send(self.state.clone());
            }
            ActorCommand::ListTools { reply } => {
                let outcome = match &self.client {
                    Some(client) => client.list_tools().await.map_err(|e| self.map_client_error(e)),
                    None => Err(ProxyError::upstream(self.name(), "upstream is not connected")),
                };
                let _ = reply.send(outcome);
            }
            ActorCommand::CallTool { tool_name, arguments, reply } => {
                let outcome = match &self.client {
                    Some(client) => client
                        .call_tool(&tool_name, arguments)
                        .await
                        .map_err(|e| self.map_client_error(e)),
                    None => Err(ProxyError::upstream(self.name(), "upstream is not connected")),
                };
                let _ = reply.send(outcome);
            }
        }
        Continue(())
    }

    fn map_client_error(&self, error: ClientError) -> ProxyError {
        match error {
            ClientError::Timeout(_) => ProxyError::upstream_timeout(self.name()),
            ClientError::Connection(e) => ProxyError::upstream(self.name(), e.to_string()),
        }
    }

    /// Attempts to establish a connection. On success, kicks off tool
    /// discovery; on a `401`/discovery-shaped failure, parks in
    /// `Authenticating` and waits for `TriggerOAuthLogin`; on any other
    /// failure, schedules a backoff retry.
    async fn connect(&mut self) {
        let name = self.name();
        self.state.state = UpstreamState::Connecting;
        self.publish_state();

        let bearer = match self.resolve_bearer_token().await {
            Ok(token) => token,
            Err(NeedsLogin) => {
                self.state.state = UpstreamState::Authenticating;
                self.state.health = Health::needs_login("token expired, re-authentication required");
                self.publish_state();
                return;
            }
        };

        match build_connection(&self.state.config, bearer.as_deref()).await {
            Ok(connection) => {
                let client = Client::new(connection);
                match client.initialize("mcpproxy", env!("CARGO_PKG_VERSION")).await {
                    Ok(capabilities) => {
                        client.set_on_tools_changed(Arc::new(NotifyOnToolsChanged(self.tx.clone()))).await;
                        self.client = Some(client);
                        self.state.state = UpstreamState::Connected;
                        self.state.health = Health::healthy("connected");
                        self.state.retry_count = 0;
                        self.state.last_retry_time = None;
                        self.state.next_retry_at = None;
                        self.publish_state();
                        self.discover().await;

                        if !mcpproxy_protocol::notifications::supports_tools_list_changed(&capabilities) {
                            debug!(server = %name, "peer lacks tools.listChanged, arming periodic re-discovery");
                            self.arm_periodic_rediscover();
                        }
                    }
                    Err(e) => self.fail_and_backoff(format!("initialize failed: {e}")),
                }
            }
            Err(BuildError::Connection(ConnectionError::Startup(msg))) if msg.contains("WWW-Authenticate") => {
                info!(server = %name, "upstream requires authentication");
                self.state.state = UpstreamState::Authenticating;
                self.state.health = Health::needs_login("authentication required");
                self.publish_state();
            }
            Err(e) => self.fail_and_backoff(e.to_string()),
        }
    }

    fn fail_and_backoff(&mut self, reason: String) {
        let name = self.name();
        warn!(server = %name, error = %reason, "connect failed, scheduling retry");
        self.state.retry_count += 1;
        self.state.last_error = Some(reason.clone());
        self.state.state = UpstreamState::Backoff;
        self.state.health = Health::unhealthy("connection failed", reason);
        let delay = backoff_delay(self.state.retry_count.saturating_sub(1), fastrand::f64());
        let now = SystemTime::now();
        self.state.last_retry_time = Some(now);
        self.state.next_retry_at = Some(now + delay);
        self.publish_state();

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ActorCommand::InternalReconnect).await;
        });
    }

    /// Spawns (replacing any previous) a timer that sends
    /// `InternalPeriodicRediscover` every 5 minutes for as long as this
    /// connection lives. Cancelled on every `disconnect`.
    fn arm_periodic_rediscover(&mut self) {
        if let Some(handle) = self.periodic_rediscover.take() {
            handle.abort();
        }
        let tx = self.tx.clone();
        self.periodic_rediscover = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(PERIODIC_REDISCOVER_INTERVAL).await;
                if tx.send(ActorCommand::InternalPeriodicRediscover).await.is_err() {
                    break;
                }
            }
        }));
    }

    async fn disconnect(&mut self, reason: &str) {
        if let Some(handle) = self.periodic_rediscover.take() {
            handle.abort();
        }
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                debug!(server = %self.name(), error = %e, "error closing upstream connection during {reason}");
            }
        }
        if let Err(e) = self.index.remove_server(&self.name()) {
            warn!(server = %self.name(), error = %e, "failed to clear tool index on disconnect");
        }
        self.state.tool_count = 0;
    }

    /// Lists tools, applies the differential index update, and publishes
    /// `tool_index_update` only when something actually changed. A
    /// notification that arrives while a discovery is already running is
    /// dropped rather than queued.
    async fn discover(&mut self) {
        let Some(client) = self.client.clone() else { return };
        if self.in_flight_discovery.swap(true, Ordering::SeqCst) {
            debug!(server = %self.name(), "discovery already in flight, dropping duplicate trigger");
            return;
        }
        let result = client.list_tools().await;
        self.in_flight_discovery.store(false, Ordering::SeqCst);

        match result {
            Ok(tools) => {
                self.state.tool_count = tools.len();
                self.state.tool_list_token_size = tools
                    .iter()
                    .map(|t| serde_json::to_string(t).map(|s| s.len() / 4).unwrap_or(0))
                    .sum();
                match self.index.apply_diff(&self.name(), &tools) {
                    Ok(diff) if !diff.is_empty() => {
                        self.event_bus.publish_tool_index_update(ToolIndexUpdateEvent {
                            server: self.name(),
                            diff,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(server = %self.name(), error = %e, "failed to apply tool index diff"),
                }
            }
            Err(e) => warn!(server = %self.name(), error = %e, "tool discovery failed"),
        }
    }

    /// Resolves the bearer token to connect with. Upstreams without
    /// OAuth configured connect unauthenticated; those with OAuth use a
    /// cached non-expired token, refreshing once if it's stale.
    async fn resolve_bearer_token(&self) -> Result<Option<String>, NeedsLogin> {
        let Some(oauth) = self.state.config.oauth.clone() else {
            return Ok(None);
        };
        let Some(cached) = self.oauth_flow.cached(&self.name()).await else {
            return Err(NeedsLogin);
        };
        if !cached.is_expired(chrono::Duration::seconds(30)) {
            return Ok(Some(cached.access_token));
        }
        let Some(refresh_token) = cached.refresh_token.clone() else {
            return Err(NeedsLogin);
        };
        let Ok((metadata, client_id)) = self.resolve_metadata(&oauth).await else {
            return Err(NeedsLogin);
        };
        match self.oauth_flow.refresh(&self.name(), &metadata, &client_id, &refresh_token).await {
            Ok(tokens) => Ok(Some(tokens.access_token)),
            Err(_) => Err(NeedsLogin),
        }
    }

    async fn resolve_metadata(
        &self,
        oauth: &mcpproxy_core::domain::OAuthConfig,
    ) -> Result<(AuthorizationServerMetadata, String), OAuthFlowError> {
        if oauth.discovery {
            let issuer = self.issuer_from_endpoint()?;
            self.oauth_flow.prepare(&issuer, oauth.client_id.as_deref(), REDIRECT_URI).await
        } else {
            let authorization_endpoint = oauth
                .authorization_endpoint
                .clone()
                .ok_or_else(|| OAuthFlowError::Http("upstream has no authorization_endpoint configured".to_string()))?;
            let token_endpoint = oauth
                .token_endpoint
                .clone()
                .ok_or_else(|| OAuthFlowError::Http("upstream has no token_endpoint configured".to_string()))?;
            let client_id = oauth
                .client_id
                .clone()
                .ok_or_else(|| OAuthFlowError::Http("upstream has no client_id configured".to_string()))?;
            Ok((
                AuthorizationServerMetadata {
                    issuer: authorization_endpoint.clone(),
                    authorization_endpoint,
                    token_endpoint,
                    registration_endpoint: None,
                    device_authorization_endpoint: None,
                    code_challenge_methods_supported: vec!["S256".to_string()],
                },
                client_id,
            ))
        }
    }

    fn issuer_from_endpoint(&self) -> Result<String, OAuthFlowError> {
        match &self.state.config.endpoint {
            UpstreamEndpoint::Url { url } => {
                let parsed = url::Url::parse(url).map_err(|e| OAuthFlowError::Http(e.to_string()))?;
                Ok(format!(
                    "{}://{}",
                    parsed.scheme(),
                    parsed.host_str().unwrap_or_default()
                ))
            }
            UpstreamEndpoint::Command {.. } => {
                Err(OAuthFlowError::Http("stdio upstreams do not support OAuth".to_string()))
            }
        }
    }

    /// `TriggerOAuthLogin`: resolves metadata, picks the
    /// authorization-code (PKCE) grant when the server supports it and
    /// falls back to device-code otherwise, and returns the URL (or
    /// verification instructions folded into the URL) the caller should
    /// show the user.
    async fn begin_oauth_login(&mut self) -> ProxyResult<String> {
        let oauth = self
            .state
            .config
            .oauth
            .clone()
            .ok_or_else(|| ProxyError::validation(ErrorCode::InvalidArgument, "upstream has no oauth configuration"))?;
        let (metadata, client_id) = self
            .resolve_metadata(&oauth)
            .await
            .map_err(|e| ProxyError::auth_error(e.to_string()))?;

        if metadata.supports_pkce() {
            let (prompt, pkce) = OAuthFlow::build_authorization_code_prompt(&metadata, &client_id, REDIRECT_URI);
            let AuthorizationPrompt::AuthorizationCode { authorize_url, redirect_uri, state } = prompt else {
                unreachable!("build_authorization_code_prompt always returns AuthorizationCode")
            };
            self.pending_oauth = Some(PendingOAuth {
                metadata,
                client_id,
                verifier: pkce.verifier,
                state,
                redirect_uri,
            });
            self.state.state = UpstreamState::Authenticating;
            self.publish_state();
            Ok(authorize_url)
        } else if metadata.supports_device_code() {
            let prompt = self
                .oauth_flow
                .start_device_code(&metadata, &client_id)
                .await
                .map_err(|e| ProxyError::auth_error(e.to_string()))?;
            let AuthorizationPrompt::DeviceCode { verification_uri, user_code, device_code, interval } = prompt else {
                unreachable!("start_device_code always returns DeviceCode")
            };
            let oauth_flow = self.oauth_flow.clone();
            let tx = self.tx.clone();
            let name = self.name();
            let metadata_clone = metadata.clone();
            let client_id_clone = client_id.clone();
            tokio::spawn(async move {
                if let Ok(tokens) = oauth_flow
                    .poll_device_code(&name, &metadata_clone, &client_id_clone, &device_code, interval)
                    .await
                {
                    let _ = tokens;
                    let _ = tx.send(ActorCommand::ToolsChangedNotification).await;
                }
            });
            self.state.state = UpstreamState::Authenticating;
            self.publish_state();
            Ok(format!("visit {verification_uri} and enter code {user_code}"))
        } else {
            Err(ProxyError::auth_error("authorization server supports neither authorization-code nor device-code grants"))
        }
    }

    /// `CompleteOAuthCallback`: finishes an authorization-code grant
    /// started by `begin_oauth_login`, then retries `connect()` with the
    /// freshly issued token.
    async fn complete_oauth_login(&mut self, code: String, state: String) -> ProxyResult<()> {
        let pending = self
            .pending_oauth
            .take()
            .ok_or_else(|| ProxyError::auth_error("no authorization flow is in progress for this upstream"))?;
        if pending.state != state {
            self.pending_oauth = Some(pending);
            return Err(ProxyError::auth_error("oauth state parameter mismatch"));
        }
        let result = self
            .oauth_flow
            .complete_authorization_code(&self.name(), &pending.metadata, &pending.client_id, &code, &pending.redirect_uri, &pending.verifier)
            .await;
        match result {
            Ok(tokens) => {
                self.state.oauth_status = OAuthStatus {
                    authenticated: true,
                    expires_at: Some(tokens.expires_at.into()),
                };
                self.connect().await;
                Ok(())
            }
            Err(e) => {
                self.state.health = Health::needs_login(format!("authorization failed: {e}"));
                self.publish_state();
                Err(ProxyError::auth_error(e.to_string()))
            }
        }
    }
}

struct NeedsLogin;

#[cfg(test)]
mod tests {
    use super::*;
    use mcpproxy_auth::tokens::InMemoryTokenStore;
    use mcpproxy_core::domain::{UpstreamEndpoint, UpstreamProtocol};
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_server(base_url: String) -> UpstreamServer {
        UpstreamServer {
            name: "stub".into(),
            protocol: UpstreamProtocol::StreamableHttp,
            endpoint: UpstreamEndpoint::Url { url: base_url },
            enabled: true,
            quarantined: false,
            isolation: None,
            oauth: None,
            tool_annotations: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    async fn deps() -> (Arc<ToolIndex>, Arc<dyn TokenStore>, Arc<OAuthFlow>, EventBus) {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        (
            Arc::new(ToolIndex::in_memory().unwrap()),
            store.clone(),
            Arc::new(OAuthFlow::new(store).unwrap()),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn enabled_actor_connects_and_discovers_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "capabilities": {} }
            })))
            .mount(&server)
            .await;

        let (index, store, oauth, bus) = deps().await;
        let handle = spawn(test_server(format!("{}/mcp", server.uri())), index, store, oauth, bus);

        let mut status = handle.status().await.unwrap();
        for _ in 0..50 {
            if status.state == UpstreamState::Connected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            status = handle.status().await.unwrap();
        }
        assert_eq!(status.state, UpstreamState::Connected);
    }

    #[tokio::test]
    async fn disable_then_enable_round_trips_admin_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": { "capabilities": {} }
            })))
            .mount(&server)
            .await;

        let (index, store, oauth, bus) = deps().await;
        let handle = spawn(test_server(format!("{}/mcp", server.uri())), index, store, oauth, bus);
        handle.disable().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.health.admin_state, mcpproxy_core::domain::AdminState::Disabled);
    }

    #[tokio::test]
    async fn unreachable_upstream_backs_off_instead_of_crashing() {
        let (index, store, oauth, bus) = deps().await;
        let handle = spawn(test_server("http://127.0.0.1:1/mcp".into()), index, store, oauth, bus);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let status = handle.status().await.unwrap();
        assert!(matches!(status.state, UpstreamState::Backoff | UpstreamState::Connecting));
    }
}
