//! `mcpproxy serve`: assembles every layer crate into one running
//! process. The CLI surface lives
//! in `crate::cli`; everything this file does is what `cli::commands::serve`
//! calls into once args are parsed.

mod cli;
mod config;
mod control;
mod logging;
mod oauth_callback;
mod paths;
mod shutdown;
mod stdio_serve;

use clap::Parser;
use cli::args::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(cli::dispatch(cli)) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            cli::error::report(&e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
