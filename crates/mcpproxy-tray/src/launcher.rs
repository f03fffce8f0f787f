//! Resolves and spawns the core daemon binary in its own process group,
//! mirroring `mcpproxy_transport::stdio::StdioConnection::spawn`'s
//! `setsid()` discipline so the tray can tear the whole tree down with
//! one signal.

use crate::config::TrayConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("no core binary found: checked {0:?}")]
    NotFound(Vec<PathBuf>),
    #[error("failed to spawn core: {0}")]
    Spawn(std::io::Error),
}

const BINARY_NAME: &str = "mcpproxy";

/// Resolution order:
/// explicit env override, a copy staged next to the tray's own
/// executable (the packaged-app layout), a short list of well-known
/// install locations, then whatever `PATH` turns up.
pub fn resolve_core_binary(config: &TrayConfig) -> Result<PathBuf, LaunchError> {
    let mut checked = Vec::new();

    if let Some(path) = &config.core_path {
        if path.is_file() {
            return Ok(path.clone());
        }
        checked.push(path.clone());
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let staged = dir.join(BINARY_NAME);
            if staged.is_file() {
                return Ok(staged);
            }
            checked.push(staged);
        }
    }

    for candidate in well_known_paths() {
        if candidate.is_file() {
            return Ok(candidate);
        }
        checked.push(candidate);
    }

    if let Some(found) = which_on_path(BINARY_NAME) {
        return Ok(found);
    }

    Err(LaunchError::NotFound(checked))
}

fn well_known_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/usr/local/bin").join(BINARY_NAME), PathBuf::from("/opt/mcpproxy/bin").join(BINARY_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local/bin").join(BINARY_NAME));
        paths.push(home.join(".mcpproxy/bin").join(BINARY_NAME));
    }
    paths
}

fn which_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(name)).find(|candidate| candidate.is_file())
}

/// A running core process. Dropping this without calling
/// [`CoreProcess::kill_group`] leaves the process group alive — callers
/// must route teardown through the FSM's `ShuttingDown` state.
pub struct CoreProcess {
    child: Child,
}

impl CoreProcess {
    pub async fn spawn(binary: &Path, config: &TrayConfig) -> Result<Self, LaunchError> {
        let mut cmd = Command::new(binary);
        cmd.arg("serve");
        if let Some(listen) = &config.tray_listen {
            cmd.arg("--listen").arg(listen);
        }
        cmd.args(&config.extra_args);
        cmd.stdin(Stdio::null()).stdout(Stdio::inherit()).stderr(Stdio::inherit()).kill_on_drop(true);

        // The tray never wants the core to spawn its own tray process
        // recursively, and the API key is only meaningful to inject
        // over plaintext TCP — the trusted local socket doesn't check it.
        cmd.env("MCPPROXY_ENABLE_TRAY", "false");
        if config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://") {
            if let Some(key) = &config.api_key {
                cmd.env("MCPPROXY_API_KEY", key);
            }
        }
        if let Some(certs_dir) = &config.certs_dir {
            cmd.env("MCPPROXY_CERTS_DIR", certs_dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid() is async-signal-safe; makes the core a
            // session leader so `shutdown::sweep_process_group` style
            // teardown reaches its whole tree, not just the immediate
            // child.
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let child = cmd.spawn().map_err(LaunchError::Spawn)?;
        info!(binary = %binary.display(), pid = child.id(), "core process launched");
        Ok(Self { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Consumes the process, waiting for it to exit and returning its
    /// exit code (`None` if terminated by a signal), feeding
    /// `fsm::Event::CoreExited`. Takes `self` by value so the wait can
    /// run inside its own spawned task without fighting the rest of the
    /// crate for `&mut` access to the `Child`.
    pub async fn wait_owned(mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}

#[cfg(unix)]
pub fn kill_group(pid: u32) {
    // SAFETY: kill(2) with a negative pid signals the whole process
    // group created by `setsid()` at spawn time; no memory is touched,
    // only a syscall is made.
    unsafe {
        libc::kill(-(pid as i32), libc::SIGTERM);
    }
}

#[cfg(not(unix))]
pub fn kill_group(_pid: u32) {
    warn!("process-group teardown is only implemented on Unix");
}
