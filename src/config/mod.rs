//! Configuration management for enclosure
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use enclosure::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `ENCLOSURE__<section>__<key>`
//!
//! Examples:
//! - `ENCLOSURE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `ENCLOSURE__PLATFORM__READ_TIMEOUT=5s`
//! - `ENCLOSURE__FALLBACK__ENABLED=false`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/enclosure.toml`.
//! This can be overridden using the `ENCLOSURE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, FallbackConfig, PlatformConfig, ServerConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`ENCLOSURE__*`)
    /// 2. TOML file (default: `config/enclosure.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[fallback]\nenabled = false\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert!(!config.fallback.enabled);
        assert_eq!(config.strategies[0].name, "html5-download");
    }

    #[test]
    fn test_validation_catches_reserved_parameter() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[strategies]]
name = "pinned"
expects = "direct"
params = { platform = "html5", cid = "1" }
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::ReservedParameter { .. })
        ));
    }

    #[test]
    fn test_oversized_duration_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[platform]\nkey_ttl = \"9999999999999999h\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
max_concurrent_resolutions = 16

[platform]
api_base = "https://api.bilibili.com"
page_base = "https://www.bilibili.com"
short_link_base = "https://b23.tv"
quality = 80
connect_timeout = "3s"
read_timeout = "10s"
key_ttl = "600s"
proxy = "http://127.0.0.1:7897"

[[strategies]]
name = "html5-download"
expects = "direct"
params = { platform = "html5", download = "1", fnval = "16" }

[[strategies]]
name = "pc-dash"
expects = "segmented"
params = { platform = "pc", fnval = "4048" }

[fallback]
enabled = true
program = "/usr/local/bin/yt-dlp"
timeout = "45s"
extra_args = ["--cookies", "cookies.txt"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.max_concurrent_resolutions, 16);
        assert_eq!(config.platform.proxy.as_deref(), Some("http://127.0.0.1:7897"));
        assert_eq!(config.strategies.len(), 2);
        assert_eq!(config.fallback.timeout, HumanDuration::from_secs(45));
        assert_eq!(config.fallback.extra_args, vec!["--cookies", "cookies.txt"]);
    }
}
