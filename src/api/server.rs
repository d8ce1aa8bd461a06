use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{health, metrics, resolve},
    state::AppState,
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::resolver::Resolver;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Routes with middleware; `/resolve` is capped at `max_concurrent` in flight.
pub fn router(state: AppState) -> Router {
    let max_concurrent = state.config.server.max_concurrent_resolutions;

    Router::new()
        .route(
            "/resolve",
            get(resolve).layer(ConcurrencyLimitLayer::new(max_concurrent)),
        )
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let metrics = Arc::new(Metrics::new());
    let resolver = Resolver::from_config(&config, metrics)
        .map_err(|e| format!("Failed to build resolver: {}", e))?;
    info!(
        strategies = resolver.strategies().len(),
        fallback = config.fallback.enabled,
        "Resolver ready"
    );

    let app = router(AppState::new(config, resolver));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "enclosure listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
