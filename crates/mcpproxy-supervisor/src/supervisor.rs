//! `Supervisor`: owns every upstream's [`ActorHandle`] and is the single
//! façade `mcpproxy-server` (MCP dispatch) and `mcpproxy-api` (REST) call
//! into. Reconciles configuration
//! reloads by diffing against the live actor set rather than tearing
//! everything down.

use crate::actor;
use crate::events::{EventBus, StatusSummary};
use crate::managed::ActorHandle;
use dashmap::DashMap;
use mcpproxy_auth::flow::OAuthFlow;
use mcpproxy_auth::tokens::TokenStore;
use mcpproxy_core::domain::{ManagedUpstream, OAuthStatus, UpstreamServer, UpstreamState};
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_index::{SearchHit, ToolIndex};
use mcpproxy_protocol::Tool;
use serde_json::Value;
use std::sync::Arc;

/// Owns the live set of upstream actors. Cheap to clone: everything
/// inside is already reference-counted.
#[derive(Clone)]
pub struct Supervisor {
    actors: Arc<DashMap<String, ActorHandle>>,
    index: Arc<ToolIndex>,
    token_store: Arc<dyn TokenStore>,
    oauth_flow: Arc<OAuthFlow>,
    event_bus: EventBus,
}

impl Supervisor {
    pub fn new(index: Arc<ToolIndex>, token_store: Arc<dyn TokenStore>, oauth_flow: Arc<OAuthFlow>, event_bus: EventBus) -> Self {
        Self {
            actors: Arc::new(DashMap::new()),
            index,
            token_store,
            oauth_flow,
            event_bus,
        }
    }

    /// Spawns one actor per configured upstream. Intended for startup;
    /// use [`Supervisor::reload_config`] afterwards to apply edits.
    pub fn spawn_all(&self, configs: Vec<UpstreamServer>) {
        for config in configs {
            self.spawn_one(config);
        }
    }

    fn spawn_one(&self, config: UpstreamServer) {
        let name = config.name.clone();
        let handle = actor::spawn(config, self.index.clone(), self.token_store.clone(), self.oauth_flow.clone(), self.event_bus.clone());
        self.actors.insert(name, handle);
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn index(&self) -> &Arc<ToolIndex> {
        &self.index
    }

    fn get(&self, name: &str) -> ProxyResult<ActorHandle> {
        self.actors.get(name).map(|e| e.value().clone()).ok_or_else(|| ProxyError::server_not_found(name))
    }

    pub fn server_names(&self) -> Vec<String> {
        self.actors.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn status(&self, name: &str) -> ProxyResult<ManagedUpstream> {
        self.get(name)?.status().await
    }

    pub async fn status_all(&self) -> Vec<ManagedUpstream> {
        let handles: Vec<ActorHandle> = self.actors.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(status) = handle.status().await {
                out.push(status);
            }
        }
        out
    }

    /// Publishes a `status` summary event reflecting how many upstreams
    /// are currently `Connected`.
    pub async fn publish_status_summary(&self) {
        let all = self.status_all().await;
        let connected = all.iter().filter(|m| m.state == UpstreamState::Connected).count();
        self.event_bus.publish_status(StatusSummary { connected, total: all.len() });
    }

    pub async fn enable(&self, name: &str) -> ProxyResult<()> {
        self.get(name)?.enable().await
    }

    pub async fn disable(&self, name: &str) -> ProxyResult<()> {
        self.get(name)?.disable().await
    }

    pub async fn restart(&self, name: &str) -> ProxyResult<()> {
        self.get(name)?.restart().await
    }

    pub async fn quarantine(&self, name: &str) -> ProxyResult<()> {
        self.get(name)?.quarantine().await
    }

    pub async fn unquarantine(&self, name: &str) -> ProxyResult<()> {
        self.get(name)?.unquarantine().await
    }

    pub async fn trigger_oauth_login(&self, name: &str) -> ProxyResult<String> {
        self.get(name)?.trigger_oauth_login().await
    }

    pub async fn complete_oauth_callback(&self, name: &str, code: String, state: String) -> ProxyResult<()> {
        self.get(name)?.complete_oauth_callback(code, state).await
    }

    pub async fn oauth_status(&self, name: &str) -> ProxyResult<OAuthStatus> {
        self.get(name)?.oauth_status().await
    }

    pub async fn list_tools(&self, name: &str) -> ProxyResult<Vec<Tool>> {
        self.get(name)?.list_tools().await
    }

    pub async fn call_tool(&self, name: &str, tool_name: &str, arguments: Value) -> ProxyResult<Value> {
        self.get(name)?.call_tool(tool_name, arguments).await
    }

    pub fn search_tools(&self, query: &str, limit: usize) -> ProxyResult<Vec<SearchHit>> {
        self.index.search(query, limit).map_err(|e| ProxyError::infrastructure(mcpproxy_core::error::ErrorCode::InternalError, e.to_string()))
    }

    /// `ReloadConfiguration`: reconciles the live actor set against `configs` by
    /// name — updates existing actors in place, spawns newly-added ones,
    /// and shuts down + drops ones no longer present.
    pub async fn reload_config(&self, configs: Vec<UpstreamServer>) {
        let incoming: std::collections::HashMap<String, UpstreamServer> =
            configs.into_iter().map(|c| (c.name.clone(), c)).collect();

        let existing: Vec<String> = self.actors.iter().map(|e| e.key().clone()).collect();
        for name in &existing {
            if !incoming.contains_key(name) {
                if let Some((_, handle)) = self.actors.remove(name) {
                    let _ = handle.shutdown().await;
                }
            }
        }

        for (name, config) in incoming {
            match self.actors.get(&name) {
                Some(handle) => {
                    let _ = handle.update_config(config).await;
                }
                None => self.spawn_one(config),
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<ActorHandle> = self.actors.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpproxy_auth::tokens::InMemoryTokenStore;
    use mcpproxy_core::domain::{UpstreamEndpoint, UpstreamProtocol};
    use std::collections::HashMap;

    fn server(name: &str) -> UpstreamServer {
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

    fn supervisor() -> Supervisor {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        Supervisor::new(
            Arc::new(ToolIndex::in_memory().unwrap()),
            store.clone(),
            Arc::new(OAuthFlow::new(store).unwrap()),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn unknown_server_reports_not_found() {
        let sup = supervisor();
        let err = sup.enable("ghost").await.unwrap_err();
        assert_eq!(err.code(), mcpproxy_core::error::ErrorCode::ServerNotFound);
    }

    #[tokio::test]
    async fn reload_config_adds_updates_and_removes() {
        let sup = supervisor();
        sup.spawn_all(vec![server("a"), server("b")]);
        assert_eq!(sup.server_names().len(), 2);

        sup.reload_config(vec![server("b"), server("c")]).await;
        let mut names = sup.server_names();
        names.sort();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    }
}
