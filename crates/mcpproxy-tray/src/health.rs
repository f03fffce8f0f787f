//! Polls the core's `/ready` endpoint through the same local-transport
//! `Dialer` the CLI uses, so the tray's notion of
//! "is the core up" matches exactly what a CLI command would see.

use mcpproxy_transport::ipc::Dialer;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    NotReady,
}

/// One poll attempt. Any transport failure (connection refused,
/// timeout, malformed body) is treated as `NotReady` rather than
/// propagated — the FSM only distinguishes "up" from "not up yet".
pub async fn poll_once(dialer: &Dialer) -> ReadyState {
    match dialer.request("GET", "/ready", None).await {
        Ok(_) => ReadyState::Ready,
        Err(_) => ReadyState::NotReady,
    }
}

/// Polls every `interval` until `/ready` answers or `deadline` elapses,
/// used while the FSM sits in `WaitingForCore` after launching the
/// child.
pub async fn wait_until_ready(dialer: &Dialer, interval: Duration, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        if poll_once(dialer).await == ReadyState::Ready {
            return true;
        }
        if start.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_not_ready() {
        let dialer = Dialer::new("http://127.0.0.1:1", None).unwrap();
        assert_eq!(poll_once(&dialer).await, ReadyState::NotReady);
    }

    #[tokio::test]
    async fn wait_until_ready_times_out_against_dead_endpoint() {
        let dialer = Dialer::new("http://127.0.0.1:1", None).unwrap();
        let ok = wait_until_ready(&dialer, Duration::from_millis(10), Duration::from_millis(30)).await;
        assert!(!ok);
    }
}
