//! Per-source normalizers for `POST /api/v1/config/import`: turn a
//! third-party MCP client's config schema into the `UpstreamServer`
//! entries mcpproxy's own registry expects. Only the import transform is
//! in scope; mcpproxy's own on-disk config format is parsed directly by
//! [`crate::config::Config`], not through this module.

use mcpproxy_core::domain::{UpstreamEndpoint, UpstreamProtocol, UpstreamServer};
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_api::state::ConfigImporter;
use std::collections::HashMap;

fn server_from_fields(name: &str, command: Option<String>, args: Vec<String>, env: HashMap<String, String>, url: Option<String>) -> UpstreamServer {
    let (protocol, endpoint) = match (command, url) {
        (Some(command), _) => (UpstreamProtocol::Stdio, UpstreamEndpoint::Command { command, args, env, working_dir: None }),
        (None, Some(url)) => (UpstreamProtocol::StreamableHttp, UpstreamEndpoint::Url { url }),
        (None, None) => (UpstreamProtocol::Stdio, UpstreamEndpoint::Command { command: String::new(), args, env, working_dir: None }),
    };
    UpstreamServer {
        name: name.to_string(),
        protocol,
        endpoint,
        enabled: true,
        quarantined: true,
        isolation: None,
        oauth: None,
        tool_annotations: HashMap::new(),
        headers: HashMap::new(),
    }
}

/// Claude Desktop, Claude Code, and Cursor all share the same
/// `{"mcpServers": {"<name>": {"command", "args", "env", "url"}}}` shape.
fn normalize_json_mcp_servers(content: &str) -> ProxyResult<Vec<UpstreamServer>> {
    #[derive(serde::Deserialize)]
    struct Entry {
        command: Option<String>,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        url: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct Document {
        #[serde(rename = "mcpServers")]
        mcp_servers: HashMap<String, Entry>,
    }

    let doc: Document = serde_json::from_str(content)
        .map_err(|e| ProxyError::validation(ErrorCode::ConfigError, format!("malformed mcpServers document: {e}")))?;
    Ok(doc
        .mcp_servers
        .into_iter()
        .map(|(name, entry)| server_from_fields(&name, entry.command, entry.args, entry.env, entry.url))
        .collect())
}

/// Gemini CLI's `settings.json` nests the same shape under `mcpServers`
/// as well, but some fields (`trust`, `timeout`) are Gemini-specific and
/// dropped here since `UpstreamServer` has no equivalent.
fn normalize_gemini_cli(content: &str) -> ProxyResult<Vec<UpstreamServer>> {
    normalize_json_mcp_servers(content)
}

/// Codex's `config.toml` uses `[mcp_servers.<name>]` tables with
/// `command`, `args`, `env`.
fn normalize_codex_toml(content: &str) -> ProxyResult<Vec<UpstreamServer>> {
    #[derive(serde::Deserialize)]
    struct Entry {
        command: Option<String>,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        url: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct Document {
        #[serde(default, rename = "mcp_servers")]
        mcp_servers: HashMap<String, Entry>,
    }

    let doc: Document =
        toml::from_str(content).map_err(|e| ProxyError::validation(ErrorCode::ConfigError, format!("malformed codex config.toml: {e}")))?;
    Ok(doc
        .mcp_servers
        .into_iter()
        .map(|(name, entry)| server_from_fields(&name, entry.command, entry.args, entry.env, entry.url))
        .collect())
}

pub fn normalize(source: &str, content: &str) -> ProxyResult<Vec<UpstreamServer>> {
    match source {
        "claude-desktop" | "claude-code" | "cursor" => normalize_json_mcp_servers(content),
        "codex-toml" => normalize_codex_toml(content),
        "gemini-cli" => normalize_gemini_cli(content),
        other => Err(ProxyError::validation(ErrorCode::ConfigError, format!("unrecognized config import source: {other}"))),
    }
}

/// Adapter handed to `mcpproxy-api`'s `AppState::importer`.
pub struct DaemonConfigImporter;

impl ConfigImporter for DaemonConfigImporter {
    fn normalize(&self, source: &str, content: &str) -> ProxyResult<Vec<UpstreamServer>> {
        normalize(source, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_claude_desktop_stdio_entry() {
        let content = r#"{
            "mcpServers": {
                "github": { "command": "npx", "args": ["-y", "@mcp/github"], "env": {"TOKEN": "x"} }
            }
        }"#;
        let servers = normalize("claude-desktop", content).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "github");
        assert!(matches!(servers[0].endpoint, UpstreamEndpoint::Command {.. }));
        assert!(servers[0].quarantined, "imported servers always start quarantined");
    }

    #[test]
    fn normalizes_codex_toml_url_entry() {
        let content = r#"
            [mcp_servers.weather]
            url = "https://weather.example/mcp"
        "#;
        let servers = normalize("codex-toml", content).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "weather");
        assert!(matches!(servers[0].endpoint, UpstreamEndpoint::Url {.. }));
    }

    #[test]
    fn rejects_unknown_source() {
        assert!(normalize("notepad", "{}").is_err());
    }
}
