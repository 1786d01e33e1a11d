//! Default paths for discipline components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/discipline/disciplined.sock` or `/tmp/discipline-$USER/disciplined.sock`
//! - Data: `$XDG_DATA_HOME/discipline` or `~/.local/share/discipline`
//! - Config: `$XDG_CONFIG_HOME/discipline/config.toml` or `~/.config/discipline/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const DISCIPLINE_SOCKET_ENV: &str = "DISCIPLINE_SOCKET";

/// Environment variable for overriding the data directory
pub const DISCIPLINE_DATA_DIR_ENV: &str = "DISCIPLINE_DATA_DIR";

const SOCKET_FILENAME: &str = "disciplined.sock";
const CONFIG_FILENAME: &str = "config.toml";
const DATABASE_FILENAME: &str = "discipline.db";

/// Application subdirectory name
const APP_DIR: &str = "discipline";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$DISCIPLINE_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/discipline/disciplined.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/discipline-$USER/disciplined.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(DISCIPLINE_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking DISCIPLINE_SOCKET.
/// Used for default values in configs where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$DISCIPLINE_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/discipline` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/discipline` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(DISCIPLINE_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking DISCIPLINE_DATA_DIR.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/discipline/config.toml`
/// 2. `~/.config/discipline/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Database file inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_contains_app_dir() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("discipline"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn data_dir_contains_app_dir() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("discipline"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("discipline"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }

    #[test]
    fn database_lives_in_data_dir() {
        let dir = PathBuf::from("/var/lib/discipline");
        assert_eq!(database_path(&dir), dir.join("discipline.db"));
    }
}
