//! Resolution engine: strategy loop, fallback, final usability guard.

use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::classify::{UnusableReason, Verdict, classify, playable_container};
use super::client::{PlatformClient, PlayApi};
use super::error::{AttemptError, FailureStage, KeyError, ResolveError};
use super::fallback::{FallbackAdapter, YtDlp};
use super::http::HttpSetupError;
use super::reference::VideoReference;
use super::strategy::{RequestStrategy, default_strategies};
use super::types::{PlayResponse, PlayTarget, Provenance, ResolvedMedia};
use crate::config::Config;
use crate::observability::Metrics;

/// Where a resolution currently is
#[derive(Debug)]
enum Stage {
    Preparing,
    TryingStrategies(usize),
    TryingFallback,
    Done(ResolvedMedia),
    Failed(ResolveError),
}

/// Outcome of one strategy attempt
enum Attempt {
    Usable(ResolvedMedia),
    Unusable(UnusableReason),
    Failed(AttemptError),
}

/// Resolves video references into directly fetchable media links.
///
/// Cheap to share behind an `Arc`; every call keeps its own state and the
/// only shared mutable piece is the key cache inside the API client.
#[derive(bon::Builder)]
pub struct Resolver {
    api: Arc<dyn PlayApi>,
    #[builder(default = default_strategies())]
    strategies: Vec<RequestStrategy>,
    fallback: Option<FallbackAdapter>,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl Resolver {
    /// Wire the platform client, strategy table and extractor from configuration.
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, HttpSetupError> {
        let client = PlatformClient::from_config(&config.platform, metrics.clone())?;
        let fallback = config
            .fallback
            .enabled
            .then(|| FallbackAdapter::new(Arc::new(YtDlp::from_config(&config.fallback))));

        Ok(Resolver::builder()
            .api(Arc::new(client))
            .strategies(config.strategies.clone())
            .maybe_fallback(fallback)
            .metrics(metrics)
            .build())
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn strategies(&self) -> &[RequestStrategy] {
        &self.strategies
    }

    /// Parse `raw` and resolve it.
    pub async fn resolve(&self, raw: &str) -> Result<ResolvedMedia, ResolveError> {
        let reference = VideoReference::parse(raw)?;
        self.resolve_reference(&reference).await
    }

    pub async fn resolve_reference(&self, reference: &VideoReference) -> Result<ResolvedMedia, ResolveError> {
        let span = info_span!(
            "resolve",
            resolution_id = %Uuid::now_v7(),
            reference = %reference,
        );
        self.run(reference).instrument(span).await
    }

    async fn run(&self, reference: &VideoReference) -> Result<ResolvedMedia, ResolveError> {
        self.metrics.resolution_started();

        let mut target: Option<PlayTarget> = None;
        let mut attempted = 0usize;
        let mut key_failure: Option<KeyError> = None;
        let mut stage = Stage::Preparing;

        loop {
            stage = match stage {
                Stage::Preparing => match self.api.lookup(reference).await {
                    Ok(found) => {
                        target = Some(found);
                        Stage::TryingStrategies(0)
                    }
                    Err(e) => {
                        warn!(error = %e, "Video lookup failed");
                        self.metrics.strategy_attempt_failed();
                        if let AttemptError::Keys(e) = e {
                            key_failure = Some(e);
                        }
                        Stage::TryingFallback
                    }
                },

                Stage::TryingStrategies(index) => match (self.strategies.get(index), target.as_ref()) {
                    (Some(strategy), Some(found)) => {
                        attempted += 1;
                        match self.attempt(found, strategy).await {
                            Attempt::Usable(media) => Stage::Done(media),
                            Attempt::Unusable(reason) => {
                                self.metrics.unusable_verdict();
                                info!(strategy = %strategy.name, %reason, "Strategy response unusable");
                                Stage::TryingStrategies(index + 1)
                            }
                            Attempt::Failed(AttemptError::Keys(e)) => {
                                self.metrics.strategy_attempt_failed();
                                warn!(strategy = %strategy.name, error = %e, "Signing keys unavailable");
                                key_failure = Some(e);
                                Stage::TryingFallback
                            }
                            Attempt::Failed(e) => {
                                self.metrics.strategy_attempt_failed();
                                warn!(strategy = %strategy.name, error = %e, "Strategy attempt failed");
                                Stage::TryingStrategies(index + 1)
                            }
                        }
                    }
                    _ => {
                        debug!(attempted, "Strategies exhausted");
                        Stage::TryingFallback
                    }
                },

                Stage::TryingFallback => match &self.fallback {
                    None => Stage::Failed(match key_failure.take() {
                        Some(e) => ResolveError::KeyFetchFailed(e),
                        None => ResolveError::AllStrategiesExhausted { attempted },
                    }),
                    Some(adapter) => {
                        let page_url = match &target {
                            Some(found) => found.page_url.clone(),
                            None => self.api.page_url(reference),
                        };
                        info!(url = %page_url, "Invoking fallback extractor");
                        match adapter.resolve(&page_url).await {
                            Ok(mut media) => {
                                if let Some(found) = &target {
                                    media.title = media.title.or_else(|| found.title.clone());
                                    media.duration_secs = media.duration_secs.or(found.duration_secs);
                                }
                                Stage::Done(media)
                            }
                            Err(e) => {
                                warn!(error = %e, "Fallback extractor failed");
                                Stage::Failed(match key_failure.take() {
                                    Some(key_error) => ResolveError::KeyFetchFailed(key_error),
                                    None => ResolveError::failed(FailureStage::Fallback, e.to_string()),
                                })
                            }
                        }
                    }
                },

                Stage::Done(media) => return self.finish(media),

                Stage::Failed(e) => {
                    self.metrics.resolution_failed();
                    warn!(error = %e, "Resolution failed");
                    return Err(e);
                }
            };
        }
    }

    async fn attempt(&self, target: &PlayTarget, strategy: &RequestStrategy) -> Attempt {
        debug!(strategy = %strategy.name, expects = %strategy.expects, "Trying strategy");

        let response = match self.api.fetch_play_data(target, strategy).await {
            Ok(response) => response,
            Err(e) => return Attempt::Failed(e),
        };

        match classify(&response) {
            Verdict::Usable(mut media) => {
                media.title = target.title.clone();
                media.duration_secs = target.duration_secs.or_else(|| response_duration(&response));
                media.strategy = Some(strategy.name.clone());
                media.headers = self.api.media_headers();
                Attempt::Usable(media)
            }
            Verdict::Unusable(reason) => Attempt::Unusable(reason),
        }
    }

    /// Last check before anything leaves the engine.
    fn finish(&self, media: ResolvedMedia) -> Result<ResolvedMedia, ResolveError> {
        if playable_container(&media.url) != Some(media.container_type) {
            self.metrics.resolution_failed();
            let stage = match media.provenance {
                Provenance::Fallback => FailureStage::Fallback,
                _ => FailureStage::PrimaryApi,
            };
            warn!(url = %media.url, "Result failed final link inspection");
            return Err(ResolveError::failed(stage, format!("not a playable link: {}", media.url)));
        }

        match media.provenance {
            Provenance::Fallback => self.metrics.resolved_fallback(),
            _ => self.metrics.resolved_primary(),
        }
        info!(
            url = %media.url,
            container = %media.container_type,
            provenance = %media.provenance,
            strategy = ?media.strategy,
            "Resolved"
        );
        Ok(media)
    }
}

fn response_duration(response: &PlayResponse) -> Option<u64> {
    match response {
        PlayResponse::Direct(direct) => direct.timelength_ms.map(|ms| ms / 1000),
        PlayResponse::Segmented(manifest) => manifest.duration_secs,
    }
}
