//! Signing key cache with lazy, single-flight refresh.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::error::KeyError;
use super::types::SigningKeyPair;
use crate::observability::Metrics;

/// Default lifetime of a fetched key pair
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(600);

/// How long a failed refresh is remembered before the source is tried again
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(15);

/// Where fresh key material comes from
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<SigningKeyPair, KeyError>;
}

/// Always hands out the same two keys, stamped with the fetch time.
#[derive(Debug, Clone)]
pub struct StaticKeys {
    img_key: String,
    sub_key: String,
}

impl StaticKeys {
    pub fn new(img_key: impl Into<String>, sub_key: impl Into<String>) -> Self {
        Self {
            img_key: img_key.into(),
            sub_key: sub_key.into(),
        }
    }
}

#[async_trait]
impl KeySource for StaticKeys {
    async fn fetch_keys(&self) -> Result<SigningKeyPair, KeyError> {
        Ok(SigningKeyPair::new(self.img_key.clone(), self.sub_key.clone()))
    }
}

/// Holds the current key pair and refreshes it when stale.
///
/// The stale-check, fetch and store run under one lock, so concurrent
/// callers that find the pair stale wait for the first caller's refresh
/// instead of starting their own. A failed refresh is remembered for the
/// retry cooldown, and callers queued behind it share that outcome rather
/// than each hitting the source again. Dropping a caller mid-refresh
/// releases the lock without touching the stored state.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    ttl: Duration,
    retry_cooldown: Duration,
    slot: Mutex<KeySlot>,
    metrics: Option<Arc<Metrics>>,
}

#[derive(Debug, Default)]
struct KeySlot {
    pair: Option<SigningKeyPair>,
    last_failure: Option<(Instant, KeyError)>,
}

impl KeySlot {
    fn usable_pair(&self) -> Option<&SigningKeyPair> {
        self.pair.as_ref().filter(|pair| pair.is_usable())
    }

    /// Serve the previous pair, or the error when there is none.
    fn fallback(&self, error: KeyError) -> Result<SigningKeyPair, KeyError> {
        self.usable_pair().cloned().ok_or(error)
    }
}

impl KeyCache {
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            slot: Mutex::new(KeySlot::default()),
            metrics: None,
        }
    }

    /// Cache over a fixed key pair; useful for tests and pinned deployments.
    pub fn fixed(img_key: impl Into<String>, sub_key: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticKeys::new(img_key, sub_key)), Duration::MAX)
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current key pair, refreshing first if it is missing or stale.
    ///
    /// When a refresh fails, a previously fetched usable pair is returned
    /// (the platform tolerates slightly old keys); otherwise the failure is
    /// surfaced.
    pub async fn get_signing_keys(&self) -> Result<SigningKeyPair, KeyError> {
        let mut slot = self.slot.lock().await;

        if let Some(pair) = slot.pair.as_ref() {
            if !pair.is_stale(self.ttl) {
                return Ok(pair.clone());
            }
        }

        if let Some((failed_at, error)) = slot.last_failure.as_ref() {
            if failed_at.elapsed() < self.retry_cooldown {
                debug!(error = %error, "Key refresh failed recently, not retrying yet");
                return slot.fallback(error.clone());
            }
        }

        if let Some(pair) = slot.pair.as_ref() {
            debug!(age_secs = pair.age().as_secs(), "Signing keys stale, refreshing");
        }

        let refreshed = match self.source.fetch_keys().await {
            Ok(pair) if pair.is_usable() => Ok(pair),
            Ok(pair) => Err(KeyError::Malformed(format!(
                "{} + {} characters",
                pair.img_key().len(),
                pair.sub_key().len()
            ))),
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(pair) => {
                if let Some(metrics) = &self.metrics {
                    metrics.key_refreshed();
                }
                info!("Signing keys refreshed");
                slot.pair = Some(pair.clone());
                slot.last_failure = None;
                Ok(pair)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.key_refresh_failed();
                }
                if slot.usable_pair().is_some() {
                    warn!(error = %e, "Key refresh failed, reusing previous pair");
                } else {
                    warn!(error = %e, "Key refresh failed with no previous pair");
                }
                slot.last_failure = Some((Instant::now(), e.clone()));
                slot.fallback(e)
            }
        }
    }

    /// Drop the held pair so the next call refetches.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        slot.last_failure = None;
        if slot.pair.take().is_some() {
            debug!("Signing keys invalidated");
        }
    }
}

#[derive(Debug, Deserialize)]
struct NavEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<NavData>,
}

#[derive(Debug, Deserialize)]
struct NavData {
    wbi_img: Option<WbiImg>,
}

#[derive(Debug, Deserialize)]
struct WbiImg {
    img_url: String,
    sub_url: String,
}

/// Reads the key pair from the platform's navigation endpoint.
///
/// Anonymous sessions get a non-zero `code` but still receive the key
/// material, so only a missing `wbi_img` block counts as failure.
pub struct NavKeySource {
    http: reqwest::Client,
    nav_url: String,
}

impl NavKeySource {
    pub fn new(http: reqwest::Client, api_base: &str) -> Self {
        Self {
            http,
            nav_url: format!("{}/x/web-interface/nav", api_base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl KeySource for NavKeySource {
    async fn fetch_keys(&self) -> Result<SigningKeyPair, KeyError> {
        debug!(url = %self.nav_url, "Fetching signing keys");

        let response = self
            .http
            .get(&self.nav_url)
            .send()
            .await
            .map_err(|e| KeyError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyError::FetchFailed(format!("HTTP {}", status.as_u16())));
        }

        let envelope: NavEnvelope = response
            .json()
            .await
            .map_err(|e| KeyError::Malformed(e.to_string()))?;

        let wbi = envelope
            .data
            .and_then(|data| data.wbi_img)
            .ok_or_else(|| {
                KeyError::FetchFailed(format!(
                    "no key material in response (code {}): {}",
                    envelope.code, envelope.message
                ))
            })?;

        let img_key = key_from_url(&wbi.img_url)
            .ok_or_else(|| KeyError::Malformed(format!("img_url: {}", wbi.img_url)))?;
        let sub_key = key_from_url(&wbi.sub_url)
            .ok_or_else(|| KeyError::Malformed(format!("sub_url: {}", wbi.sub_url)))?;

        Ok(SigningKeyPair::new(img_key, sub_key))
    }
}

/// File stem of the URL's last path segment
fn key_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let file = parsed.path_segments()?.next_back()?;
    let stem = file.split('.').next()?;
    (!stem.is_empty()).then(|| stem.to_string())
}
