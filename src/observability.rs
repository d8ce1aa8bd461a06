//! Tracing setup and in-process resolution counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "enclosure=info,tower_http=info";

/// Install the global subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    resolutions_started: AtomicU64,
    resolved_primary: AtomicU64,
    resolved_fallback: AtomicU64,
    failures: AtomicU64,
    strategy_attempt_failures: AtomicU64,
    unusable_verdicts: AtomicU64,
    key_refreshes: AtomicU64,
    key_refresh_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution_started(&self) {
        self.resolutions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resolved_primary(&self) {
        self.resolved_primary.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "resolved_primary", "Metric incremented");
    }

    pub fn resolved_fallback(&self) {
        self.resolved_fallback.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "resolved_fallback", "Metric incremented");
    }

    pub fn resolution_failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "failures", "Metric incremented");
    }

    pub fn strategy_attempt_failed(&self) {
        self.strategy_attempt_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unusable_verdict(&self) {
        self.unusable_verdicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_refreshed(&self) {
        self.key_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_refresh_failed(&self) {
        self.key_refresh_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "key_refresh_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            resolutions_started: self.resolutions_started.load(Ordering::Relaxed),
            resolved_primary: self.resolved_primary.load(Ordering::Relaxed),
            resolved_fallback: self.resolved_fallback.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            strategy_attempt_failures: self.strategy_attempt_failures.load(Ordering::Relaxed),
            unusable_verdicts: self.unusable_verdicts.load(Ordering::Relaxed),
            key_refreshes: self.key_refreshes.load(Ordering::Relaxed),
            key_refresh_failures: self.key_refresh_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub resolutions_started: u64,
    pub resolved_primary: u64,
    pub resolved_fallback: u64,
    pub failures: u64,
    pub strategy_attempt_failures: u64,
    pub unusable_verdicts: u64,
    pub key_refreshes: u64,
    pub key_refresh_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.resolution_started();
        metrics.resolution_started();
        metrics.strategy_attempt_failed();
        metrics.resolved_fallback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.resolutions_started, 2);
        assert_eq!(snapshot.strategy_attempt_failures, 1);
        assert_eq!(snapshot.resolved_fallback, 1);
        assert_eq!(snapshot.resolved_primary, 0);
    }
}
