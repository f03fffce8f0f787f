//! `ControlPlane` adapter:
//! reaches back into the daemon's own config file and supervisor, which
//! `mcpproxy-api` deliberately doesn't depend on.

use crate::config::Config;
use async_trait::async_trait;
use mcpproxy_api::state::ControlPlane;
use mcpproxy_core::error::{ErrorCode, ProxyError, ProxyResult};
use mcpproxy_supervisor::Supervisor;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub struct DaemonControlPlane {
    supervisor: Supervisor,
    config_path: PathBuf,
    /// Serializes reload/start/stop against concurrent REST calls; each
    /// re-reads the config file fresh so a tray-triggered reload picks up
    /// edits made outside the process.
    lock: Mutex<()>,
}

impl DaemonControlPlane {
    pub fn new(supervisor: Supervisor, config_path: PathBuf) -> Self {
        Self { supervisor, config_path, lock: Mutex::new(()) }
    }

    fn load_config(&self) -> ProxyResult<Config> {
        Config::load(&self.config_path).map_err(|e| ProxyError::infrastructure(ErrorCode::ConfigError, e.to_string()))
    }
}

#[async_trait]
impl ControlPlane for DaemonControlPlane {
    /// Re-spawns every configured upstream that isn't already running —
    /// effectively `reload` without removing anything no longer present.
    async fn start(&self) -> ProxyResult<()> {
        let _guard = self.lock.lock().await;
        let config = self.load_config()?;
        self.supervisor.spawn_all(config.servers);
        Ok(())
    }

    /// Tears down every upstream actor but leaves the HTTP listener and
    /// process itself running, so the REST surface stays reachable to
    /// issue a subsequent `start`/`reload`.
    async fn stop(&self) -> ProxyResult<()> {
        let _guard = self.lock.lock().await;
        self.supervisor.shutdown_all().await;
        Ok(())
    }

    /// `ReloadConfiguration`: re-reads the config file
    /// and reconciles the live actor set against it.
    async fn reload(&self) -> ProxyResult<()> {
        let _guard = self.lock.lock().await;
        let config = self.load_config()?;
        self.supervisor.reload_config(config.servers).await;
        Ok(())
    }
}
