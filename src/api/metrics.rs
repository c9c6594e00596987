//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format to token holders.

use axum::{
    Router, middleware,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::auth::require_auth;
use crate::error::AppError;
use crate::metrics::REGISTRY;

/// GET /metrics
///
/// Returns all registered metrics in Prometheus text format.
async fn metrics_handler() -> Result<Response, AppError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let metrics_text = encoder.encode_to_string(&metric_families).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        AppError::Internal(e.into())
    })?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
        metrics_text,
    )
        .into_response())
}

/// Create metrics router
///
/// Exposes the `/metrics` endpoint behind any valid access token.
pub fn metrics_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
