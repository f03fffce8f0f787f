//! In-memory `Config`, its defaults, and its validation. The on-disk schema's *parsing details* are out of
//! scope, but the struct every other module binds to
//! is not — carries it as the seam the REST control
//! plane, the supervisor, and the CLI all read from.

pub mod import;

use mcpproxy_core::domain::UpstreamServer;
use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub verbosity: u8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { json: false, verbosity: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDeclarationConfig {
    #[serde(default = "default_true")]
    pub strict_server_validation: bool,
}

impl Default for IntentDeclarationConfig {
    fn default() -> Self {
        Self { strict_server_validation: true }
    }
}

/// The daemon's on-disk config document: `listen_addr`, `tls`, `logging`,
/// `api_key`, `servers`, `intent_declaration.strict_server_validation`,
/// `tray_endpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub api_key: Option<String>,
    #[serde(default)]
    pub servers: Vec<UpstreamServer>,
    #[serde(default)]
    pub intent_declaration: IntentDeclarationConfig,
    /// The socket/pipe/TCP endpoint a tray process dials to reach this
    /// core.
    pub tray_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tls: TlsConfig::default(),
            logging: LoggingConfig::default(),
            api_key: None,
            servers: Vec::new(),
            intent_declaration: IntentDeclarationConfig::default(),
            tray_endpoint: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("upstream server entry is invalid: {0}")]
    Server(#[from] mcpproxy_core::domain::UpstreamConfigError),
    #[error("listen_addr must not be empty")]
    EmptyListenAddr,
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self).expect("Config always serializes");
        std::fs::write(path, raw).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::EmptyListenAddr);
        }
        for server in &self.servers {
            server.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(std::path::Path::new("/nonexistent/mcp_config.json")).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert!(config.intent_declaration.strict_server_validation);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_config.json");
        let mut config = Config::default();
        config.api_key = Some("secret".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn rejects_blank_listen_addr() {
        let mut config = Config::default();
        config.listen_addr = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyListenAddr)));
    }
}
