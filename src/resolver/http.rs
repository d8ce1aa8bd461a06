//! HTTP client for the platform API

use reqwest::{Client, Proxy};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::error::AttemptError;

#[derive(Debug, Error)]
pub enum HttpSetupError {
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("HTTP client construction failed: {0}")]
    Build(String),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Thin wrapper that applies timeouts and maps failures to [`AttemptError`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig, proxy_url: Option<&str>) -> Result<Self, HttpSetupError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = proxy_url {
            let proxy = Proxy::all(url).map_err(|e| HttpSetupError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| HttpSetupError::Build(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Underlying client, shared with the key source
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    /// GET `url` with `query` and `headers`, decoding a JSON body.
    pub async fn get_json<T, Q>(&self, url: &str, query: &Q, headers: &[(&str, &str)]) -> Result<T, AttemptError>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        debug!(url, "Platform request");

        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AttemptError::Decode(e.to_string()))
    }

    /// Follow redirects from `url` and return where they end.
    pub async fn final_url(&self, url: &str) -> Result<String, AttemptError> {
        let response = self.client.get(url).send().await?;
        let landed = response.url().to_string();
        debug!(from = url, to = %landed, status = response.status().as_u16(), "Redirect chain resolved");
        Ok(landed)
    }
}
