//! Config validation CLI tool
//!
//! Validates a pcgated configuration file and reports any errors.

use pcgate_config::{ConfigError, Settings};
use pcgate_util::{default_config_path, DeviceId};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) if path == "-h" || path == "--help" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Some(path) => PathBuf::from(path),
        None => default_config_path(),
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        eprintln!();
        print_usage();
        return ExitCode::from(1);
    }

    match pcgate_config::load_config(&config_path) {
        Ok(settings) => {
            print_summary(&settings);
            ExitCode::SUCCESS
        }
        Err(ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ Configuration has {} error(s):", errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    let default_path = default_config_path();
    eprintln!("Usage: validate-config [config-file]");
    eprintln!();
    eprintln!("Validates a pcgated configuration file.");
    eprintln!();
    eprintln!("If no path is provided, uses: {}", default_path.display());
}

fn print_summary(settings: &Settings) {
    println!("✓ Configuration is valid");
    println!();
    println!("Summary:");
    println!("  Config version: {}", pcgate_config::CURRENT_CONFIG_VERSION);
    println!("  Authority: {}", settings.authority.url);
    println!("  Table: {}", settings.authority.table);
    println!(
        "  API key: {}",
        if settings.authority.api_key.is_some() { "set" } else { "not set" }
    );
    println!("  Request timeout: {}s", settings.authority.request_timeout.as_secs());
    println!("  Poll interval: {}s", settings.agent.poll_interval.as_secs());
    println!("  Grace period: {}s", settings.agent.grace_period.as_secs());
    println!("  Socket: {}", settings.agent.socket_path.display());
    println!(
        "  Content URL (device 1): {}",
        settings.agent.content_url(DeviceId::new(1))
    );
}
