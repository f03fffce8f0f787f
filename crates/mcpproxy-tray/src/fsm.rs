//! The tray's finite state machine, factored out as
//! a pure transition function so it can be driven by injected fake exit
//! codes and fake probe results in tests rather than a real Docker
//! daemon or a real port clash.
//! ```text
//! Initializing → LaunchingCore → WaitingForCore → ConnectingAPI → Connected
//! ↘ SkipCore (detected/forced) ↗
//! Any → Reconnecting → ConnectingAPI | Failed
//! Docker-unavailable probe → CoreErrorDocker → (exp. backoff recheck) → CoreRecoveringDocker → LaunchingCore
//! Shutdown: any → ShuttingDown (idempotent, guarded by a single-shot)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    LaunchingCore,
    WaitingForCore,
    ConnectingApi,
    Connected,
    SkipCore,
    Reconnecting,
    CoreErrorDocker,
    CoreRecoveringDocker,
    /// Carries the exit-code-derived reason so the menu can show it
    CoreError(CoreErrorKind),
    Failed,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorKind {
    PortConflict,
    DbLocked,
    ConfigError,
    PermissionError,
    General,
}

impl CoreErrorKind {
    /// "Exit codes: 0 ok, 2 port conflict, 3 db locked, 4
    /// config invalid, 5 permission denied, 1 generic".
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            2 => Self::PortConflict,
            3 => Self::DbLocked,
            4 => Self::ConfigError,
            5 => Self::PermissionError,
            _ => Self::General,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// `MCPPROXY_TRAY_SKIP_CORE` set, or a core was already detected
    /// listening at the configured endpoint.
    SkipCoreRequested,
    LaunchCore,
    CoreListening,
    ApiConnected,
    /// The core process exited; carries its exit code (`None` if killed
    /// by a signal, treated as `General`).
    CoreExited(Option<i32>),
    /// SSE stream or health polling observed an I/O loss on an
    /// otherwise-connected core.
    ConnectionLost,
    DockerUnavailable,
    DockerProbeSucceeded,
    /// A `Reconnecting` attempt either exhausted its budget or the
    /// underlying error is not retryable.
    ReconnectExhausted,
    Shutdown,
}

/// Pure transition: `(state, event) -> state`. No I/O, no sleeping —
/// callers (launcher/health monitor) decide what each resulting state
/// means to actually do.
pub fn transition(state: State, event: &Event) -> State {
    if matches!(event, Event::Shutdown) {
        return State::ShuttingDown;
    }
    if state == State::ShuttingDown {
        // Idempotent: once shutting down, nothing moves it elsewhere.
        return state;
    }

    match (state, event) {
        (State::Initializing, Event::SkipCoreRequested) => State::SkipCore,
        (State::Initializing, Event::LaunchCore) => State::LaunchingCore,
        (State::SkipCore, Event::LaunchCore) => State::ConnectingApi,
        (State::LaunchingCore, Event::CoreListening) => State::WaitingForCore,
        (State::LaunchingCore, Event::CoreExited(code)) => core_exit_state(code.unwrap_or(-1)),
        (State::LaunchingCore, Event::DockerUnavailable) => State::CoreErrorDocker,
        (State::WaitingForCore, Event::ApiConnected) => State::ConnectingApi,
        (State::WaitingForCore, Event::CoreExited(code)) => core_exit_state(code.unwrap_or(-1)),
        (State::ConnectingApi, Event::ApiConnected) => State::Connected,
        (State::ConnectingApi, Event::CoreExited(code)) => core_exit_state(code.unwrap_or(-1)),
        (State::ConnectingApi, Event::ConnectionLost) => State::Reconnecting,
        (State::Connected, Event::ConnectionLost) => State::Reconnecting,
        (State::Connected, Event::CoreExited(code)) => core_exit_state(code.unwrap_or(-1)),
        (State::Reconnecting, Event::ApiConnected) => State::Connected,
        (State::Reconnecting, Event::ReconnectExhausted) => State::Failed,
        (State::CoreErrorDocker, Event::DockerProbeSucceeded) => State::CoreRecoveringDocker,
        (State::CoreRecoveringDocker, Event::LaunchCore) => State::LaunchingCore,
        (State::CoreRecoveringDocker, Event::DockerUnavailable) => State::CoreErrorDocker,
        (State::Failed, Event::LaunchCore) => State::LaunchingCore,
        (any_core_error, Event::LaunchCore) if matches!(any_core_error, State::CoreError(_)) => State::LaunchingCore,
        // Any state can fall into CoreError on an observed core exit
        // that wasn't explicitly handled above (covers `Initializing`'s
        // race against an already-dead process, and retrying from an
        // existing CoreError).
        (_, Event::CoreExited(code)) => core_exit_state(code.unwrap_or(-1)),
        (unchanged, _) => unchanged,
    }
}

fn core_exit_state(code: i32) -> State {
    State::CoreError(CoreErrorKind::from_exit_code(code))
}

/// Guards the shutdown sequence so repeated `Shutdown` events (e.g. a
/// second ctrl-c while the first is still tearing down) run the
/// teardown body exactly once.
#[derive(Debug, Default)]
pub struct ShutdownOnce(AtomicBool);

impl ShutdownOnce {
    /// Returns `true` the first time it's called, `false` every time
    /// after.
    pub fn begin(&self) -> bool {
        self.0.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_connected() {
        let mut s = State::Initializing;
        for event in [Event::LaunchCore, Event::CoreListening, Event::ApiConnected, Event::ApiConnected] {
            s = transition(s, &event);
        }
        assert_eq!(s, State::Connected);
    }

    #[test]
    fn skip_core_bypasses_launch() {
        let s = transition(State::Initializing, &Event::SkipCoreRequested);
        assert_eq!(s, State::SkipCore);
        let s = transition(s, &Event::LaunchCore);
        assert_eq!(s, State::ConnectingApi);
    }

    #[test]
    fn exit_code_2_maps_to_port_conflict() {
        let s = transition(State::LaunchingCore, &Event::CoreExited(Some(2)));
        assert_eq!(s, State::CoreError(CoreErrorKind::PortConflict));
    }

    #[test]
    fn exit_code_5_maps_to_permission_error() {
        let s = transition(State::WaitingForCore, &Event::CoreExited(Some(5)));
        assert_eq!(s, State::CoreError(CoreErrorKind::PermissionError));
    }

    #[test]
    fn unrecognized_exit_code_is_general_error() {
        let s = transition(State::Connected, &Event::CoreExited(Some(17)));
        assert_eq!(s, State::CoreError(CoreErrorKind::General));
    }

    #[test]
    fn connection_loss_from_connected_goes_to_reconnecting() {
        let s = transition(State::Connected, &Event::ConnectionLost);
        assert_eq!(s, State::Reconnecting);
    }

    #[test]
    fn reconnect_exhaustion_is_terminal_failed() {
        let s = transition(State::Reconnecting, &Event::ReconnectExhausted);
        assert_eq!(s, State::Failed);
    }

    #[test]
    fn docker_unavailable_then_probe_recovers_into_relaunch() {
        let s = transition(State::LaunchingCore, &Event::DockerUnavailable);
        assert_eq!(s, State::CoreErrorDocker);
        let s = transition(s, &Event::DockerProbeSucceeded);
        assert_eq!(s, State::CoreRecoveringDocker);
        let s = transition(s, &Event::LaunchCore);
        assert_eq!(s, State::LaunchingCore);
    }

    #[test]
    fn shutdown_from_any_state_is_terminal_and_idempotent() {
        for start in [State::Initializing, State::Connected, State::Failed, State::CoreErrorDocker] {
            let s = transition(start, &Event::Shutdown);
            assert_eq!(s, State::ShuttingDown);
            // A second shutdown (or any other event) doesn't move it.
            let s2 = transition(s, &Event::LaunchCore);
            assert_eq!(s2, State::ShuttingDown);
        }
    }

    #[test]
    fn shutdown_once_fires_exactly_once() {
        let guard = ShutdownOnce::default();
        assert!(guard.begin());
        assert!(!guard.begin());
        assert!(!guard.begin());
    }
}
