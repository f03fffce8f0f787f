//! Standalone tray binary: reads its configuration from the
//! environment, runs [`mcpproxy_tray::Tray`] until it
//! settles, and forwards `ctrl-c`/`SIGTERM` into its shutdown channel.

use mcpproxy_tray::{config::TrayConfig, Tray};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = TrayConfig::from_env();
    let mut tray = Tray::new(config);

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(()).await;
    });

    if let Err(e) = tray.run(shutdown_rx).await {
        tracing::error!(error = %e, "tray exited with error");
        std::process::exit(1);
    }
}
