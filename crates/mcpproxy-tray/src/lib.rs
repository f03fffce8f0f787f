//! Tray launcher and state machine: supervises the
//! `mcpproxy` core as a child process, reports its health, and keeps a
//! live connection to its event stream — the menu-bar half of the
//! system that has no business knowing about upstream servers, tool
//! indexing, or OAuth at all. Icon rendering is explicitly out of scope
//!; this crate only runs the supervision loop a
//! real system-tray shell would drive.

pub mod config;
pub mod fsm;
pub mod health;
pub mod launcher;
pub mod sse;

use config::TrayConfig;
use fsm::{CoreErrorKind, Event, ShutdownOnce, State};
use launcher::{CoreProcess, LaunchError};
use mcpproxy_transport::ipc::Dialer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// "the tray state machine selects the next free port in
/// `[8081..8130]`". Tried in order; the first one a bare TCP bind
/// succeeds on is handed to the relaunched core.
const PORT_RETRY_RANGE: std::ops::RangeInclusive<u16> = 8081..=8130;

async fn next_free_port() -> Option<u16> {
    for port in PORT_RETRY_RANGE {
        if tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok() {
            return Some(port);
        }
    }
    None
}

/// Drives the FSM to completion (`Failed` or `ShuttingDown`), owning
/// the core child process and the background SSE/health tasks. This is
/// the whole of what a tray binary's `main` needs to call.
pub struct Tray {
    config: TrayConfig,
    state: State,
    shutdown_once: Arc<ShutdownOnce>,
    core_pid: Option<u32>,
}

impl Tray {
    pub fn new(config: TrayConfig) -> Self {
        Self { config, state: State::Initializing, shutdown_once: Arc::new(ShutdownOnce::default()), core_pid: None }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn apply(&mut self, event: Event) {
        let next = fsm::transition(self.state, &event);
        if next != self.state {
            if self.config.state_debug {
                info!(from = ?self.state, to = ?next, ?event, "tray state transition");
            } else {
                tracing::debug!(from = ?self.state, to = ?next, ?event, "tray state transition");
            }
        }
        self.state = next;
    }

    /// Launches the core binary per `self.config`, then polls `/ready`
    /// until it answers or `core_timeout` elapses, applying the matching
    /// FSM events. Split out of `run` so the port-conflict retry below can
    /// call it again against an updated listen address.
    async fn launch_and_wait(&mut self, event_tx: &mpsc::Sender<Event>, event_rx: &mut mpsc::Receiver<Event>) -> Result<(), LaunchError> {
        if self.state == State::LaunchingCore {
            let binary = launcher::resolve_core_binary(&self.config)?;
            let core = CoreProcess::spawn(&binary, &self.config).await?;
            self.core_pid = core.id();
            self.apply(Event::CoreListening);
            let tx = event_tx.clone();
            tokio::spawn(async move {
                match core.wait_owned().await {
                    Ok(code) => {
                        let _ = tx.send(Event::CoreExited(code)).await;
                    }
                    Err(e) => warn!(error = %e, "failed to wait on core process"),
                }
            });
        }
        if self.state == State::SkipCore || self.state == State::LaunchingCore {
            self.apply(Event::LaunchCore);
        }

        let dialer = Dialer::new(&self.config.endpoint, self.config.api_key.clone()).ok();
        if let Some(dialer) = &dialer {
            if matches!(self.state, State::WaitingForCore | State::ConnectingApi) {
                let ready = health::wait_until_ready(dialer, Duration::from_millis(500), self.config.core_timeout).await;
                if ready {
                    // `WaitingForCore -> ConnectingApi` on the first
                    // successful `/ready`, then `ConnectingApi ->
                    // Connected` once the handshake is treated as
                    // complete — this tray has no further handshake
                    // beyond a reachable `/ready`, so both fire back to
                    // back.
                    self.apply(Event::ApiConnected);
                    self.apply(Event::ApiConnected);
                } else {
                    // The exit code usually already raced us here through
                    // the channel; prefer it over a bare timeout so
                    // `CoreErrorKind::from_exit_code` sees the real code.
                    let queued = event_rx.try_recv().ok().and_then(|e| match e {
                        Event::CoreExited(code) => Some(code),
                        _ => None,
                    });
                    self.apply(Event::CoreExited(queued.unwrap_or(None)));
                }
            }
        }
        Ok(())
    }

    /// Rewrites every address field in `self.config` to point at `port` on
    /// localhost, for the port-conflict retry below.
    fn rebind_port(&mut self, port: u16) {
        let scheme = if self.config.tls_enabled { "https" } else { "http" };
        self.config.core_url = format!("{scheme}://127.0.0.1:{port}");
        self.config.endpoint = self.config.core_url.clone();
        self.config.tray_port = Some(port);
        self.config.tray_listen = Some(format!("127.0.0.1:{port}"));
    }

    /// Runs until the FSM settles into `Failed` or `ShuttingDown`.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<(), LaunchError> {
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);

        self.apply(if self.config.skip_core { Event::SkipCoreRequested } else { Event::LaunchCore });
        self.launch_and_wait(&event_tx, &mut event_rx).await?;

        // Core exited on a port conflict: pick the next free port and
        // retry, until a launch succeeds or the range is exhausted.
        while let State::CoreError(CoreErrorKind::PortConflict) = self.state {
            let Some(port) = next_free_port().await else {
                warn!("no free port available in 8081..8130 for core relaunch");
                break;
            };
            warn!(port, "core exited on a port conflict, retrying on next free port");
            self.rebind_port(port);
            self.apply(Event::LaunchCore);
            self.launch_and_wait(&event_tx, &mut event_rx).await?;
        }

        if self.state == State::Connected && self.config.endpoint.starts_with("http") {
            let core_url = self.config.core_url.clone();
            let tx = event_tx.clone();
            tokio::spawn(async move { sse::run(&core_url, tx).await });
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.apply(Event::Shutdown);
                }
                Some(event) = event_rx.recv() => {
                    self.apply(event);
                }
                else => break,
            }

            if self.state == State::ShuttingDown {
                if self.shutdown_once.begin() {
                    if let Some(pid) = self.core_pid {
                        launcher::kill_group(pid);
                    }
                }
                break;
            }
            if self.state == State::Failed {
                warn!("tray giving up after exhausting reconnect attempts");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TrayConfig {
        TrayConfig {
            core_url: "http://127.0.0.1:8080".to_string(),
            tray_listen: Some("127.0.0.1:8080".to_string()),
            tray_port: Some(8080),
            tls_enabled: false,
            api_key: None,
            core_path: None,
            skip_core: false,
            core_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            state_debug: false,
            endpoint: "http://127.0.0.1:8080".to_string(),
            extra_args: Vec::new(),
            certs_dir: None,
        }
    }

    #[test]
    fn rebind_port_rewrites_every_address_field() {
        let mut tray = Tray::new(test_config());
        tray.rebind_port(8095);
        assert_eq!(tray.config.core_url, "http://127.0.0.1:8095");
        assert_eq!(tray.config.endpoint, "http://127.0.0.1:8095");
        assert_eq!(tray.config.tray_listen.as_deref(), Some("127.0.0.1:8095"));
        assert_eq!(tray.config.tray_port, Some(8095));
    }

    #[test]
    fn rebind_port_keeps_https_scheme_when_tls_enabled() {
        let mut config = test_config();
        config.tls_enabled = true;
        let mut tray = Tray::new(config);
        tray.rebind_port(8099);
        assert_eq!(tray.config.core_url, "https://127.0.0.1:8099");
    }

    #[tokio::test]
    async fn next_free_port_finds_a_bindable_port_in_range() {
        let port = next_free_port().await.expect("range should have a free port in test sandbox");
        assert!(PORT_RETRY_RANGE.contains(&port));
    }
}
