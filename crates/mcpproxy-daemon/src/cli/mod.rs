//! CLI entry point: parses [`args::Cli`] and routes to
//! the matching `commands::*` implementation.

pub mod args;
pub mod commands;
pub mod error;

use args::Command;
use error::CliError;

pub async fn dispatch(cli: args::Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve(args) => commands::serve::run(args, cli.config, cli.verbose).await,
        Command::Auth(args) => commands::auth::run(args, cli.config).await,
        Command::Doctor(args) => commands::doctor::run(args, cli.config).await,
        Command::Logs(args) => commands::logs::run(args),
        Command::Activity(args) => commands::activity::run(args, cli.config).await,
        Command::Call(args) => commands::call::run(args, cli.config).await,
    }
}
