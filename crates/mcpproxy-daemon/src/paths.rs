//! Persisted state layout: `~/.mcpproxy/` holds the
//! config, the sled database, certs, the Unix socket, and (on Linux)
//! logs; macOS and Windows relocate logs to their platform conventions.

use std::path::PathBuf;

/// `~/.mcpproxy` — created on first run if missing.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".mcpproxy")
}

pub fn config_path() -> PathBuf {
    home_dir().join("mcp_config.json")
}

pub fn database_path() -> PathBuf {
    home_dir().join("config.db")
}

pub fn certs_dir() -> PathBuf {
    home_dir().join("certs")
}

pub fn socket_path() -> PathBuf {
    home_dir().join("mcpproxy.sock")
}

/// `~/Library/Logs/mcpproxy/` on macOS, `%LOCALAPPDATA%/mcpproxy/logs/`
/// on Windows, `~/.mcpproxy/logs/` everywhere else.
pub fn logs_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library/Logs/mcpproxy")
    }
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mcpproxy/logs")
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        home_dir().join("logs")
    }
}

pub fn ensure_layout() -> std::io::Result<()> {
    std::fs::create_dir_all(home_dir())?;
    std::fs::create_dir_all(certs_dir())?;
    std::fs::create_dir_all(logs_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_and_socket_live_under_home_dir() {
        assert_eq!(database_path(), home_dir().join("config.db"));
        assert_eq!(socket_path(), home_dir().join("mcpproxy.sock"));
    }
}
