use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "ENCLOSURE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/enclosure.toml";
const ENV_PREFIX: &str = "ENCLOSURE";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // ENCLOSURE__PLATFORM__READ_TIMEOUT -> platform.read_timeout
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;
    use crate::resolver::strategy::ResponseShape;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.platform.api_base, "https://api.bilibili.com");
        assert_eq!(config.platform.key_ttl, HumanDuration::from_secs(600));
        assert_eq!(config.strategies.len(), 3);
        assert!(config.fallback.enabled);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[platform]
read_timeout = "5s"
key_ttl = "10m"
quality = 64

[fallback]
enabled = false
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.platform.read_timeout, HumanDuration::from_secs(5));
        assert_eq!(config.platform.key_ttl, HumanDuration::from_secs(600));
        assert_eq!(config.platform.quality, 64);
        assert!(!config.fallback.enabled);
        assert_eq!(config.fallback.program, "yt-dlp");
    }

    #[test]
    fn test_strategy_table_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[strategies]]
name = "html5"
expects = "direct"
params = { platform = "html5", download = "1" }

[[strategies]]
name = "dash"
expects = "segmented"
params = { platform = "pc", fnval = "4048" }
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.strategies.len(), 2);
        assert_eq!(config.strategies[0].name, "html5");
        assert_eq!(config.strategies[0].params["download"], "1");
        assert_eq!(config.strategies[1].expects, ResponseShape::Segmented);
    }
}
