//! Default paths for pcgate components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/pcgate/config.toml` or `~/.config/pcgate/config.toml`
//! - Socket: `$XDG_RUNTIME_DIR/pcgate/pcgated.sock` or `/tmp/pcgate-$USER/pcgated.sock`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const PCGATE_CONFIG_ENV: &str = "PCGATE_CONFIG";

/// Environment variable for overriding the socket path
pub const PCGATE_SOCKET_ENV: &str = "PCGATE_SOCKET";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "pcgated.sock";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "pcgate";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$PCGATE_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/pcgate/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/pcgate/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(PCGATE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the PCGATE_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
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

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$PCGATE_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/pcgate/pcgated.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/pcgate-$USER/pcgated.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(PCGATE_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the PCGATE_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}
