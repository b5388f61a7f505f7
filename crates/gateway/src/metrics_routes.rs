//! Prometheus scrape endpoint.

#[cfg(feature = "prometheus")]
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

#[cfg(feature = "prometheus")]
use crate::server::AppState;

/// `GET /metrics` in Prometheus text exposition format.
///
/// Unauthenticated so scrapers can reach it.
#[cfg(feature = "prometheus")]
pub async fn prometheus_metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.gateway.metrics_handle.as_ref() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not enabled".to_string(),
        ),
    }
}
