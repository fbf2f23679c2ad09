//! Configuration parsing and validation for pcgated
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Authority connection settings
//! - Poll cadence, grace period and display content
//! - Environment overrides for deployment secrets
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding `authority.url`
pub const AUTHORITY_URL_ENV: &str = "PCGATE_AUTHORITY_URL";

/// Environment variable overriding `authority.api_key`
pub const API_KEY_ENV: &str = "PCGATE_API_KEY";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;
    finish(raw)
}

/// Load the config the way the agent does at startup.
///
/// A missing file means all defaults. Environment overrides are applied
/// after the file and before validation.
pub fn load_agent_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    let mut raw = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        debug!(path = %path.display(), "No config file, using defaults");
        RawConfig::default()
    };

    apply_overrides(&mut raw, |key| std::env::var(key).ok());
    finish(raw)
}

/// Apply environment-style overrides from `lookup`
pub fn apply_overrides(raw: &mut RawConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(AUTHORITY_URL_ENV) {
        raw.authority.url = Some(url);
    }
    if let Some(key) = lookup(API_KEY_ENV) {
        raw.authority.api_key = Some(key);
    }
    if let Some(socket) = lookup(pcgate_util::PCGATE_SOCKET_ENV) {
        raw.agent.socket_path = Some(socket.into());
    }
}

fn finish(raw: RawConfig) -> ConfigResult<Settings> {
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
