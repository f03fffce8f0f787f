//! `mcpproxy logs --request-id <id>`: greps the
//! persisted daily log files under `paths::logs_dir()` for lines that
//! mention a request id, since every log line touching a request is
//! tagged with it regardless of JSON vs plain-text formatting
use crate::{cli::error::CliError, paths};
use clap::Args;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Only print lines mentioning this request id.
    #[arg(long)]
    pub request_id: Option<String>,

    /// Print only the last N matching lines (0 = unlimited).
    #[arg(long, default_value_t = 200)]
    pub tail: usize,
}

pub fn run(args: LogsArgs) -> Result<(), CliError> {
    let dir = paths::logs_dir();
    let mut entries: Vec<_> = std::fs::read_dir(&dir)?.filter_map(Result::ok).map(|e| e.path()).filter(|p| p.is_file()).collect();
    entries.sort();

    let mut matches = Vec::new();
    for path in entries {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        for line in content.lines() {
            let matched = match &args.request_id {
                Some(id) => line.contains(id.as_str()),
                None => true,
            };
            if matched {
                matches.push(line.to_string());
            }
        }
    }

    let start = if args.tail > 0 && matches.len() > args.tail { matches.len() - args.tail } else { 0 };
    for line in &matches[start..] {
        println!("{line}");
    }
    if matches.is_empty() {
        match &args.request_id {
            Some(id) => println!("no log lines found mentioning request id {id}"),
            None => println!("no log lines found under {}", dir.display()),
        }
    }
    Ok(())
}
