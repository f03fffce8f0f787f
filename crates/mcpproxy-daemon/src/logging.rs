//! Wires `tracing` to stderr and to a rotating file under `logs/`
//!. Returns the appender guard the caller must keep alive for
//! the process lifetime — dropping it stops the background flush
//! thread.

use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// `json` mirrors a config flag: structured JSON
/// for log aggregation, or human-readable `fmt` for interactive use.
pub fn init(logs_dir: &Path, verbosity: u8, json: bool) -> std::io::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(logs_dir, "mcpproxy.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("mcpproxy={level},warn")));

    let stderr_layer = tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr);
    let file_layer = if json {
        tracing_subscriber::fmt::layer().json().with_writer(file_writer).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard { _file_guard: file_guard })
}
