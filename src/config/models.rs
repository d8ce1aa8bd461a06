use crate::humanize::HumanDuration;
use crate::resolver::http::DEFAULT_USER_AGENT;
use crate::resolver::strategy::{RequestStrategy, default_strategies};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Request presets in priority order; replaces the built-in table when set
    #[serde(default = "default_strategies")]
    pub strategies: Vec<RequestStrategy>,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            platform: PlatformConfig::default(),
            strategies: default_strategies(),
            fallback: FallbackConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Resolutions served at once; further requests queue
    #[serde(default = "default_max_concurrent_resolutions")]
    pub max_concurrent_resolutions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_concurrent_resolutions: default_max_concurrent_resolutions(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_concurrent_resolutions() -> usize {
    64
}

/// Video platform endpoints and request policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_page_base")]
    pub page_base: String,
    #[serde(default = "default_short_link_base")]
    pub short_link_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Requested quality code (`qn`); 80 is 1080p
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: HumanDuration,
    /// Lifetime of the signing key pair
    #[serde(default = "default_key_ttl")]
    pub key_ttl: HumanDuration,
    pub proxy: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            page_base: default_page_base(),
            short_link_base: default_short_link_base(),
            user_agent: default_user_agent(),
            quality: default_quality(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            key_ttl: default_key_ttl(),
            proxy: None,
        }
    }
}

fn default_api_base() -> String {
    "https://api.bilibili.com".to_string()
}

fn default_page_base() -> String {
    "https://www.bilibili.com".to_string()
}

fn default_short_link_base() -> String {
    "https://b23.tv".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_quality() -> u32 {
    80
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(3)
}

fn default_read_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_key_ttl() -> HumanDuration {
    HumanDuration::from_secs(600)
}

/// External extractor used when the platform API yields nothing playable
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_enabled")]
    pub enabled: bool,
    #[serde(default = "default_fallback_program")]
    pub program: String,
    #[serde(default = "default_fallback_timeout")]
    pub timeout: HumanDuration,
    /// Passed before the URL, e.g. `["--cookies", "cookies.txt"]`
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: default_fallback_enabled(),
            program: default_fallback_program(),
            timeout: default_fallback_timeout(),
            extra_args: Vec::new(),
        }
    }
}

fn default_fallback_enabled() -> bool {
    true
}

fn default_fallback_program() -> String {
    "yt-dlp".to_string()
}

fn default_fallback_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}
