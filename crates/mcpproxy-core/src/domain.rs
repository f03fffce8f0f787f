//! Configured and runtime entities: `UpstreamServer`, `ManagedUpstream`,
//! `ToolDocument`. See 

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Wire protocol an upstream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamProtocol {
    Stdio,
    Http,
    StreamableHttp,
    Sse,
}

/// How to reach an upstream: exactly one of these two shapes, enforced by
/// `UpstreamServer::validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamEndpoint {
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        working_dir: Option<String>,
    },
    Url { url: String },
}

/// Forces Docker wrapping of a stdio command, 
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IsolationConfig {
    pub enabled: bool,
}

/// OAuth configuration attached to an upstream. `discovery` toggles RFC
/// 8414 / OIDC discovery; explicit endpoints bypass it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub discovery: bool,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
}

/// A configured upstream entity. `name` is the stable identifier used as
/// a `qualifiedName` prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub name: String,
    pub protocol: UpstreamProtocol,
    pub endpoint: UpstreamEndpoint,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `true`: newly added upstreams start quarantined until
    /// an operator explicitly trusts them.
    #[serde(default = "default_true")]
    pub quarantined: bool,
    #[serde(default)]
    pub isolation: Option<IsolationConfig>,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    #[serde(default)]
    pub tool_annotations: HashMap<String, mcpproxy_protocol::ToolAnnotations>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// A configuration error in an `UpstreamServer` literal.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamConfigError {
    #[error("upstream '{0}' has no name")]
    MissingName(String),
    #[error("upstream '{name}' must set exactly one of command/url")]
    AmbiguousEndpoint { name: String },
}

impl UpstreamServer {
    pub fn validate(&self) -> Result<(), UpstreamConfigError> {
        if self.name.trim().is_empty() {
            return Err(UpstreamConfigError::MissingName(self.name.clone()));
        }
        match (&self.protocol, &self.endpoint) {
            (UpstreamProtocol::Stdio, UpstreamEndpoint::Command { command,.. }) if !command.trim().is_empty() => Ok(()),
            (UpstreamProtocol::Stdio, _) => Err(UpstreamConfigError::AmbiguousEndpoint { name: self.name.clone() }),
            (_, UpstreamEndpoint::Url { url }) if !url.trim().is_empty() => Ok(()),
            _ => Err(UpstreamConfigError::AmbiguousEndpoint { name: self.name.clone() }),
        }
    }
}

/// Per-upstream lifecycle state, state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Quarantined,
    Backoff,
    Failed,
    Shutdown,
}

/// Health level: the single source of truth UI/menu code must read,
/// never a transient `connected` boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    Enabled,
    Disabled,
    Quarantined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub level: HealthLevel,
    pub admin_state: AdminState,
    pub summary: String,
    pub detail: Option<String>,
    /// Suggested user action, e.g. `"login"` when OAuth refresh failed.
    pub action: Option<String>,
}

impl Health {
    pub fn healthy(summary: impl Into<String>) -> Self {
        Self {
            level: HealthLevel::Healthy,
            admin_state: AdminState::Enabled,
            summary: summary.into(),
            detail: None,
            action: None,
        }
    }

    pub fn unhealthy(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            level: HealthLevel::Unhealthy,
            admin_state: AdminState::Enabled,
            summary: summary.into(),
            detail: Some(detail.into()),
            action: None,
        }
    }

    pub fn needs_login(summary: impl Into<String>) -> Self {
        Self {
            level: HealthLevel::Degraded,
            admin_state: AdminState::Enabled,
            summary: summary.into(),
            detail: None,
            action: Some("login".to_string()),
        }
    }

    pub fn quarantined() -> Self {
        Self {
            level: HealthLevel::Unhealthy,
            admin_state: AdminState::Quarantined,
            summary: "quarantined".to_string(),
            detail: None,
            action: Some("unquarantine".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthStatus {
    pub authenticated: bool,
    pub expires_at: Option<SystemTime>,
}

/// Runtime mirror of a configured upstream. Mutated only by
/// the owning `UpstreamActor`.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedUpstream {
    pub config: UpstreamServer,
    pub state: UpstreamState,
    pub health: Health,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub last_retry_time: Option<SystemTime>,
    pub next_retry_at: Option<SystemTime>,
    pub tool_count: usize,
    pub tool_list_token_size: usize,
    pub oauth_status: OAuthStatus,
    pub session_id: Option<String>,
}

impl ManagedUpstream {
    pub fn new(config: UpstreamServer) -> Self {
        let health = if config.quarantined {
            Health::quarantined()
        } else {
            Health::unhealthy("not yet connected", "awaiting first connect attempt")
        };
        Self {
            state: if config.quarantined {
                UpstreamState::Quarantined
            } else {
                UpstreamState::Disconnected
            },
            health,
            last_error: None,
            retry_count: 0,
            last_retry_time: None,
            next_retry_at: None,
            tool_count: 0,
            tool_list_token_size: 0,
            oauth_status: OAuthStatus::default(),
            session_id: None,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Retry policy constants 
pub const RETRY_BASE: Duration = Duration::from_secs(2);
pub const RETRY_CAP: Duration = Duration::from_secs(30);
pub const RETRY_SUSTAINED_RESET: Duration = Duration::from_secs(30);

/// Exponential backoff delay with jitter: `min(base * 2^attempt, cap)`.
/// `jitter_fraction` in `[0, 1)` is injected so callers can use a
/// deterministic RNG in tests.
pub fn backoff_delay(attempt: u32, jitter_fraction: f64) -> Duration {
    let exp = 2u64.saturating_pow(attempt.min(20));
    let base_ms = RETRY_BASE.as_millis() as u64;
    let cap_ms = RETRY_CAP.as_millis() as u64;
    let raw = base_ms.saturating_mul(exp).min(cap_ms);
    let jitter = (raw as f64 * jitter_fraction.clamp(0.0, 0.999) * 0.2) as u64;
    Duration::from_millis(raw + jitter)
}

/// A tool document indexed by the search index and joined against by
/// activity records and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDocument {
    pub qualified_name: String,
    pub server: String,
    pub tool_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub annotations: mcpproxy_protocol::ToolAnnotations,
}

impl ToolDocument {
    pub fn qualify(server: &str, tool_name: &str) -> String {
        format!("{server}:{tool_name}")
    }

    pub fn from_tool(server: &str, tool: &mcpproxy_protocol::Tool) -> Self {
        Self {
            qualified_name: Self::qualify(server, &tool.name),
            server: server.to_string(),
            tool_name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(serde_json::Value::Null),
            annotations: tool.annotations.clone().unwrap_or_default(),
        }
    }

    /// Split `"server:tool"` on the first `:` to route dispatch
    pub fn split_qualified(qualified_name: &str) -> Option<(&str, &str)> {
        qualified_name.split_once(':')
    }

    /// `call_with` recommendation 
    pub fn recommended_call_with(&self) -> &'static str {
        if self.annotations.destructive_hint.unwrap_or(false) {
            "call_tool_destructive"
        } else if self.annotations.read_only_hint.unwrap_or(false) {
            "call_tool_read"
        } else {
            "call_tool_write"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_exactly_one_endpoint() {
        let mut server = UpstreamServer {
            name: "github".into(),
            protocol: UpstreamProtocol::Stdio,
            endpoint: UpstreamEndpoint::Command {
                command: "gh-mcp".into(),
                args: vec![],
                env: HashMap::new(),
                working_dir: None,
            },
            enabled: true,
            quarantined: true,
            isolation: None,
            oauth: None,
            tool_annotations: HashMap::new(),
            headers: HashMap::new(),
        };
        assert!(server.validate().is_ok());

        server.endpoint = UpstreamEndpoint::Command {
            command: String::new(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
        };
        assert!(server.validate().is_err());
    }

    #[test]
    fn new_upstream_defaults_to_quarantined_health() {
        let server = UpstreamServer {
            name: "x".into(),
            protocol: UpstreamProtocol::Http,
            endpoint: UpstreamEndpoint::Url { url: "https://x".into() },
            enabled: true,
            quarantined: true,
            isolation: None,
            oauth: None,
            tool_annotations: HashMap::new(),
            headers: HashMap::new(),
        };
        let managed = ManagedUpstream::new(server);
        assert_eq!(managed.state, UpstreamState::Quarantined);
        assert_eq!(managed.health.level, HealthLevel::Unhealthy);
    }

    #[test]
    fn backoff_respects_cap() {
        let d0 = backoff_delay(0, 0.0);
        assert_eq!(d0, Duration::from_secs(2));
        let d_large = backoff_delay(10, 0.0);
        assert!(d_large <= Duration::from_millis(30_000 + 6_000));
    }

    #[test]
    fn qualified_name_round_trips() {
        let qn = ToolDocument::qualify("github", "delete_repo");
        assert_eq!(qn, "github:delete_repo");
        assert_eq!(ToolDocument::split_qualified(&qn), Some(("github", "delete_repo")));
    }

    #[test]
    fn recommends_most_specific_variant() {
        let mut doc = ToolDocument {
            qualified_name: "s:t".into(),
            server: "s".into(),
            tool_name: "t".into(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
            annotations: mcpproxy_protocol::ToolAnnotations::default(),
        };
        assert_eq!(doc.recommended_call_with(), "call_tool_write");
        doc.annotations.read_only_hint = Some(true);
        assert_eq!(doc.recommended_call_with(), "call_tool_read");
        doc.annotations.destructive_hint = Some(true);
        assert_eq!(doc.recommended_call_with(), "call_tool_destructive");
    }
}
