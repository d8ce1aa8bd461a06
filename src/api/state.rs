use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::resolver::Resolver;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<Resolver>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// The resolver must record into `metrics` for `/metrics` to reflect it.
    pub fn new(config: Config, resolver: Resolver) -> Self {
        let metrics = resolver.metrics().clone();
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            metrics,
        }
    }
}
