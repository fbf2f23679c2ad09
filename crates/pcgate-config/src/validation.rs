//! Configuration validation

use crate::schema::{RawAgentConfig, RawAuthorityConfig, RawConfig};
use thiserror::Error;

/// Placeholder substituted with the device id in the content URL template
pub const DEVICE_ID_PLACEHOLDER: &str = "{id}";

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("authority.url is required (set it in the config file or PCGATE_AUTHORITY_URL)")]
    MissingAuthorityUrl,

    #[error("Invalid URL '{value}': {message}")]
    InvalidUrl { value: String, message: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },

    #[error("agent.content_url_template must contain '{}'", DEVICE_ID_PLACEHOLDER)]
    TemplateMissingPlaceholder,
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    errors.extend(validate_authority(&config.authority));
    errors.extend(validate_agent(&config.agent));
    errors
}

fn validate_authority(authority: &RawAuthorityConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match authority.url.as_deref() {
        None => errors.push(ValidationError::MissingAuthorityUrl),
        Some(url) => {
            if let Err(message) = check_http_url(url) {
                errors.push(ValidationError::InvalidUrl {
                    value: url.to_string(),
                    message,
                });
            }
        }
    }

    if let Some(table) = &authority.table
        && table.trim().is_empty() {
            errors.push(ValidationError::EmptyField {
                field: "authority.table",
            });
        }

    if authority.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "authority.request_timeout_seconds",
        });
    }

    errors
}

fn validate_agent(agent: &RawAgentConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if agent.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "agent.poll_interval_seconds",
        });
    }

    if agent.grace_period_seconds == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "agent.grace_period_seconds",
        });
    }

    if let Some(message) = &agent.transient_message
        && message.trim().is_empty() {
            errors.push(ValidationError::EmptyField {
                field: "agent.transient_message",
            });
        }

    if let Some(template) = &agent.content_url_template
        && !template.contains(DEVICE_ID_PLACEHOLDER) {
            errors.push(ValidationError::TemplateMissingPlaceholder);
        }

    errors
}

/// Accept only absolute http(s) URLs with a host
fn check_http_url(url: &str) -> Result<(), String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| "scheme must be http or https".to_string())?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return Err("missing host".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RawConfig {
        let mut config = RawConfig::default();
        config.authority.url = Some("https://example.supabase.co".into());
        config
    }

    #[test]
    fn defaults_with_url_are_valid() {
        assert!(validate_config(&valid_config()).is_empty());
    }

    #[test]
    fn missing_url_is_reported() {
        let errors = validate_config(&RawConfig::default());
        assert!(matches!(errors.as_slice(), [ValidationError::MissingAuthorityUrl]));
    }

    #[test]
    fn bad_scheme_and_empty_host() {
        assert!(check_http_url("ftp://example.com").is_err());
        assert!(check_http_url("https://").is_err());
        assert!(check_http_url("http://localhost:54321/").is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = valid_config();
        config.authority.request_timeout_seconds = Some(0);
        config.agent.poll_interval_seconds = Some(0);
        config.agent.grace_period_seconds = Some(0);
        config.agent.content_url_template = Some("http://kiosk/overlay".into());

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::TemplateMissingPlaceholder)));
    }

    #[test]
    fn empty_table_rejected() {
        let mut config = valid_config();
        config.authority.table = Some("  ".into());

        let errors = validate_config(&config);
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::EmptyField { field: "authority.table" }]
        ));
    }
}
