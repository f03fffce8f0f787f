//! Shared root cancellation and the shutdown-completeness sweep
use tokio_util::sync::CancellationToken;

/// Derives every long-lived task's cancellation handle from one root
/// token, so a single `ctrl_c`/`SIGTERM` cancels everything downstream
pub async fn wait_for_signal(root: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c");
    }
    root.cancel();
}

/// Ensure-termination sweep: every spawned upstream child
/// lives in its own process group (see `mcpproxy_transport::stdio`'s
/// `setsid()` call); on Unix, signalling the negated pid reaches the
/// whole group. This is a best-effort verification pass, not the
/// primary teardown path — each `UpstreamActor::shutdown` already closes
/// its own child via `kill_on_drop`.
#[cfg(unix)]
pub fn sweep_process_group(pid: i32) {
    // SAFETY: signalling our own process group with a terminal signal is
    // the documented way to reach every descendant that inherited it via
    // setsid(), and SIGTERM is not async-signal-unsafe to send.
    unsafe {
        libc::kill(-pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
pub fn sweep_process_group(_pid: i32) {
    // Windows job-object teardown already tears down the whole tree when
    // the job handle is dropped; there is no separate sweep step here.
}
