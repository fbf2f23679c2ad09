//! Validated settings structures

use crate::schema::{RawAgentConfig, RawAuthorityConfig, RawConfig};
use crate::validation::DEVICE_ID_PLACEHOLDER;
use pcgate_util::{default_socket_path, DeviceId};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "pcs_status";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_CONTENT_URL_TEMPLATE: &str = "http://localhost:3005/#/pc-overlay/{id}";
pub const DEFAULT_TRANSIENT_MESSAGE: &str =
    "Espere un momento que estamos preparando todo\npara que puedas seguir sirviendo";

/// Validated configuration ready for use by the agent
#[derive(Debug, Clone)]
pub struct Settings {
    pub authority: AuthoritySettings,
    pub agent: AgentSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            authority: AuthoritySettings::from_raw(raw.authority),
            agent: AgentSettings::from_raw(raw.agent),
        }
    }
}

/// Remote authority connection settings
#[derive(Debug, Clone)]
pub struct AuthoritySettings {
    pub url: String,
    pub api_key: Option<String>,
    pub table: String,
    pub request_timeout: Duration,
}

impl AuthoritySettings {
    fn from_raw(raw: RawAuthorityConfig) -> Self {
        Self {
            url: raw.url.unwrap_or_default().trim_end_matches('/').to_string(),
            api_key: raw.api_key.filter(|k| !k.is_empty()),
            table: raw.table.unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            request_timeout: raw
                .request_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

/// Local agent settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub transient_message: String,
    pub content_url_template: String,
    pub socket_path: PathBuf,
}

impl AgentSettings {
    fn from_raw(raw: RawAgentConfig) -> Self {
        Self {
            poll_interval: raw
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            grace_period: raw
                .grace_period_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GRACE_PERIOD),
            transient_message: raw
                .transient_message
                .unwrap_or_else(|| DEFAULT_TRANSIENT_MESSAGE.to_string()),
            content_url_template: raw
                .content_url_template
                .unwrap_or_else(|| DEFAULT_CONTENT_URL_TEMPLATE.to_string()),
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
        }
    }

    /// The display URL for one device
    pub fn content_url(&self, device_id: DeviceId) -> String {
        self.content_url_template
            .replace(DEVICE_ID_PLACEHOLDER, &device_id.to_string())
    }
}
