//! Environment-variable surface the tray reads at startup. All of it is optional — every field
//! has a default suitable for "launch the tray next to a freshly
//! installed core with no prior configuration".

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TrayConfig {
    /// `MCPPROXY_CORE_URL` — where the tray expects the core's REST
    /// surface once launched. Defaults to the loopback TCP address the
    /// core itself defaults to.
    pub core_url: String,
    /// `MCPPROXY_TRAY_LISTEN` / `MCPPROXY_TRAY_PORT` — if the tray
    /// exposes its own local status surface (future use); currently
    /// only parsed and stored.
    pub tray_listen: Option<String>,
    pub tray_port: Option<u16>,
    pub tls_enabled: bool,
    /// `MCPPROXY_API_KEY` — forwarded to the spawned core's env, and
    /// used by the tray's own health/SSE client, only in TCP mode.
    pub api_key: Option<String>,
    /// `MCPPROXY_CORE_PATH` — explicit override for the core binary;
    /// skips the resolution order in [`crate::launcher`].
    pub core_path: Option<PathBuf>,
    /// `MCPPROXY_TRAY_SKIP_CORE` — assume a core is already running and
    /// go straight to `ConnectingApi`.
    pub skip_core: bool,
    /// `MCPPROXY_TRAY_CORE_TIMEOUT` — how long to wait for the spawned
    /// core to start listening before giving up.
    pub core_timeout: Duration,
    /// `MCPPROXY_TRAY_RETRY_DELAY` — base delay for the tray's own
    /// retry policy, overriding the 2s default.
    pub retry_delay: Duration,
    /// `MCPPROXY_TRAY_STATE_DEBUG` — log every FSM transition at info
    /// level instead of debug.
    pub state_debug: bool,
    /// `MCPPROXY_TRAY_ENDPOINT` — local transport endpoint (`unix://`,
    /// `npipe://`, or `http(s)://`) used for health polling and CLI-style
    /// dialing, independent of `core_url`'s SSE-capable address.
    pub endpoint: String,
    /// `MCPPROXY_TRAY_EXTRA_ARGS` — space-separated extra argv appended
    /// when launching the core.
    pub extra_args: Vec<String>,
    /// `MCPPROXY_CERTS_DIR` — passed through to the core when TLS is
    /// enabled.
    pub certs_dir: Option<PathBuf>,
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str) -> bool {
    matches!(env(name).as_deref(), Some("1") | Some("true") | Some("yes"))
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    env(name).and_then(|v| v.parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(default)
}

impl TrayConfig {
    /// Reads the process environment. Never fails: malformed values
    /// fall back to defaults rather than aborting tray startup over a
    /// typo'd env var.
    pub fn from_env() -> Self {
        Self {
            core_url: env("MCPPROXY_CORE_URL").unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
            tray_listen: env("MCPPROXY_TRAY_LISTEN"),
            tray_port: env("MCPPROXY_TRAY_PORT").and_then(|v| v.parse().ok()),
            tls_enabled: env_bool("MCPPROXY_TLS_ENABLED"),
            api_key: env("MCPPROXY_API_KEY"),
            core_path: env("MCPPROXY_CORE_PATH").map(PathBuf::from),
            skip_core: env_bool("MCPPROXY_TRAY_SKIP_CORE"),
            core_timeout: env_duration_secs("MCPPROXY_TRAY_CORE_TIMEOUT", Duration::from_secs(30)),
            retry_delay: env_duration_secs("MCPPROXY_TRAY_RETRY_DELAY", Duration::from_secs(2)),
            state_debug: env_bool("MCPPROXY_TRAY_STATE_DEBUG"),
            endpoint: env("MCPPROXY_TRAY_ENDPOINT").unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
            extra_args: env("MCPPROXY_TRAY_EXTRA_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            certs_dir: env("MCPPROXY_CERTS_DIR").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_common_truthy_spellings() {
        std::env::set_var("MCPPROXY_TRAY_TEST_BOOL", "true");
        assert!(env_bool("MCPPROXY_TRAY_TEST_BOOL"));
        std::env::set_var("MCPPROXY_TRAY_TEST_BOOL", "0");
        assert!(!env_bool("MCPPROXY_TRAY_TEST_BOOL"));
        std::env::remove_var("MCPPROXY_TRAY_TEST_BOOL");
    }

    #[test]
    fn malformed_duration_falls_back_to_default() {
        std::env::set_var("MCPPROXY_TRAY_TEST_DURATION", "not-a-number");
        assert_eq!(env_duration_secs("MCPPROXY_TRAY_TEST_DURATION", Duration::from_secs(7)), Duration::from_secs(7));
        std::env::remove_var("MCPPROXY_TRAY_TEST_DURATION");
    }
}
