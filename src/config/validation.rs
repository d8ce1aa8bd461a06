use super::models::Config;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No request strategies configured")]
    NoStrategies,

    #[error("Duplicate strategy name '{0}'")]
    DuplicateStrategy(String),

    #[error("Strategy '{strategy}' sets reserved parameter '{param}'")]
    ReservedParameter { strategy: String, param: String },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: String },

    #[error("Invalid URL for {field}: {value}")]
    InvalidBaseUrl { field: String, value: String },

    #[error("Fallback is enabled but no extractor program is set")]
    MissingFallbackProgram,

    #[error("max_concurrent_resolutions must be positive")]
    ZeroConcurrency,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_strategies(config)?;
    validate_platform(config)?;
    validate_fallback(config)?;
    validate_server(config)?;
    Ok(())
}

/// At least one strategy, unique names, no client-managed parameters
fn validate_strategies(config: &Config) -> Result<(), ValidationError> {
    if config.strategies.is_empty() {
        return Err(ValidationError::NoStrategies);
    }

    let mut seen = HashSet::new();
    for strategy in &config.strategies {
        if !seen.insert(strategy.name.as_str()) {
            return Err(ValidationError::DuplicateStrategy(strategy.name.clone()));
        }
        if let Some(param) = strategy.reserved_overrides().first() {
            return Err(ValidationError::ReservedParameter {
                strategy: strategy.name.clone(),
                param: param.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_platform(config: &Config) -> Result<(), ValidationError> {
    let platform = &config.platform;

    for (field, value) in [
        ("platform.api_base", &platform.api_base),
        ("platform.page_base", &platform.page_base),
        ("platform.short_link_base", &platform.short_link_base),
    ] {
        validate_http_url(field, value)?;
    }

    for (field, value) in [
        ("platform.connect_timeout", platform.connect_timeout),
        ("platform.read_timeout", platform.read_timeout),
        ("platform.key_ttl", platform.key_ttl),
    ] {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration {
                field: field.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_fallback(config: &Config) -> Result<(), ValidationError> {
    let fallback = &config.fallback;
    if !fallback.enabled {
        return Ok(());
    }
    if fallback.program.trim().is_empty() {
        return Err(ValidationError::MissingFallbackProgram);
    }
    if fallback.timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "fallback.timeout".to_string(),
        });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_concurrent_resolutions == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidBaseUrl {
        field: field.to_string(),
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;
    use crate::resolver::strategy::{RequestStrategy, ResponseShape};

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_strategy_table() {
        let mut config = Config::default();
        config.strategies.clear();
        assert!(matches!(validate(&config), Err(ValidationError::NoStrategies)));
    }

    #[test]
    fn test_duplicate_strategy_names() {
        let mut config = Config::default();
        let first = config.strategies[0].clone();
        config.strategies.push(first);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateStrategy(name)) if name == "html5-download"
        ));
    }

    #[test]
    fn test_reserved_parameter() {
        let mut config = Config::default();
        config.strategies = vec![RequestStrategy::new(
            "sneaky",
            ResponseShape::Direct,
            &[("platform", "html5"), ("w_rid", "abc")],
        )];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ReservedParameter { param, .. }) if param == "w_rid"
        ));
    }

    #[test]
    fn test_zero_durations() {
        let mut config = Config::default();
        config.platform.key_ttl = HumanDuration::from_secs(0);
        assert!(matches!(validate(&config), Err(ValidationError::ZeroDuration { .. })));

        let mut config = Config::default();
        config.fallback.timeout = HumanDuration::from_secs(0);
        assert!(matches!(validate(&config), Err(ValidationError::ZeroDuration { .. })));

        config.fallback.enabled = false;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.platform.api_base = "ftp://api.example.com".to_string();
        assert!(matches!(validate(&config), Err(ValidationError::InvalidBaseUrl { .. })));

        config.platform.api_base = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ValidationError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_missing_fallback_program() {
        let mut config = Config::default();
        config.fallback.program = "  ".to_string();
        assert!(matches!(validate(&config), Err(ValidationError::MissingFallbackProgram)));
    }
}
