//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Remote authority connection settings
    #[serde(default)]
    pub authority: RawAuthorityConfig,

    /// Local agent behaviour
    #[serde(default)]
    pub agent: RawAgentConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            config_version: crate::CURRENT_CONFIG_VERSION,
            authority: RawAuthorityConfig::default(),
            agent: RawAgentConfig::default(),
        }
    }
}

/// Authority settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAuthorityConfig {
    /// Base URL of the REST service (e.g. https://example.supabase.co)
    pub url: Option<String>,

    /// API key sent as `apikey` and bearer token
    pub api_key: Option<String>,

    /// Table holding one record per device (default: pcs_status)
    pub table: Option<String>,

    /// Per-request timeout in seconds (default: 5)
    pub request_timeout_seconds: Option<u64>,
}

/// Agent settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAgentConfig {
    /// Poll cadence in seconds (default: 5)
    pub poll_interval_seconds: Option<u64>,

    /// Delay between granting and hiding the overlay, in seconds (default: 3)
    pub grace_period_seconds: Option<u64>,

    /// Text shown during the grace period
    pub transient_message: Option<String>,

    /// Page the display shows while blocking; `{id}` is replaced by the device id
    pub content_url_template: Option<String>,

    /// IPC socket path for display clients
    pub socket_path: Option<PathBuf>,
}
