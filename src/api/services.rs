use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::debug;

use super::{
    models::{HealthResponse, ResolveQuery, ResolveResponse},
    state::AppState,
};
use crate::api::error::ApiError;
use crate::resolver::VideoReference;

/// Resolve a page URL into a directly fetchable media link (GET /resolve)
///
/// The reference is parsed up front so malformed input is a 400 without
/// touching the platform. Resolution failures map to 502 and key fetch
/// failures to 503; see [`ApiError`].
pub async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let reference = VideoReference::parse(&query.url)?;
    debug!(reference = %reference, "Resolve requested");

    let media = state.resolver.resolve_reference(&reference).await?;
    Ok(Json(media.into()))
}

/// Counter snapshot (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        strategies: state.resolver.strategies().len(),
        fallback_enabled: state.config.fallback.enabled,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
