//! Maps an [`UpstreamServer`]'s configured protocol/endpoint to the
//! matching `mcpproxy-transport` connection type.

use mcpproxy_core::domain::{UpstreamEndpoint, UpstreamProtocol, UpstreamServer};
use mcpproxy_transport::connection::{ConnectionError, UpstreamConnection};
use mcpproxy_transport::http::{StreamableHttpConfig, StreamableHttpConnection};
use mcpproxy_transport::stdio::{StdioConfig, StdioConnection};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("upstream '{name}' is configured for {protocol:?} but has no matching endpoint shape")]
    MismatchedEndpoint { name: String, protocol: UpstreamProtocol },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Spawns or dials the connection a configured upstream needs, applying
/// Docker isolation and an OAuth bearer token where applicable. Does
/// not perform the MCP `initialize` handshake; callers do that via
/// [`UpstreamConnection::initialize`] so the managed layer can observe
/// handshake failures distinctly from transport startup failures.
pub async fn build_connection(
    server: &UpstreamServer,
    bearer_token: Option<&str>,
) -> Result<Arc<dyn UpstreamConnection>, BuildError> {
    match (server.protocol, &server.endpoint) {
        (UpstreamProtocol::Stdio, UpstreamEndpoint::Command { command, args, env, working_dir }) => {
            let config = StdioConfig {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
                working_dir: working_dir.clone(),
                docker_isolated: server.isolation.map(|i| i.enabled).unwrap_or(false),
            };
            let connection = StdioConnection::spawn(config).await?;
            Ok(Arc::new(connection))
        }
        (UpstreamProtocol::Http | UpstreamProtocol::StreamableHttp | UpstreamProtocol::Sse, UpstreamEndpoint::Url { url }) => {
            let config = StreamableHttpConfig {
                base_url: url.clone(),
                headers: server.headers.clone(),
                bearer_token: bearer_token.map(str::to_string),
                request_timeout: Duration::from_secs(15),
            };
            let connection = Arc::new(StreamableHttpConnection::new(config)?);
            connection.spawn_notification_listener();
            Ok(connection)
        }
        (protocol, _) => Err(BuildError::MismatchedEndpoint { name: server.name.clone(), protocol }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn rejects_stdio_protocol_with_url_endpoint() {
        let server = UpstreamServer {
            name: "broken".into(),
            protocol: UpstreamProtocol::Stdio,
            endpoint: UpstreamEndpoint::Url { url: "https://x".into() },
            enabled: true,
            quarantined: false,
            isolation: None,
            oauth: None,
            tool_annotations: HashMap::new(),
            headers: HashMap::new(),
        };
        let err = build_connection(&server, None).await.unwrap_err();
        assert!(matches!(err, BuildError::MismatchedEndpoint {.. }));
    }

    #[tokio::test]
    async fn connects_http_endpoint() {
        let server = UpstreamServer {
            name: "http-srv".into(),
            protocol: UpstreamProtocol::StreamableHttp,
            endpoint: UpstreamEndpoint::Url { url: "http://127.0.0.1:0/mcp".into() },
            enabled: true,
            quarantined: false,
            isolation: None,
            oauth: None,
            tool_annotations: HashMap::new(),
            headers: HashMap::new(),
        };
        assert!(build_connection(&server, Some("token")).await.is_ok());
    }
}
