//! Liveness and metrics endpoints for the task-management surface.

use axum::Json;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /metrics` — renders the `metrics_prometheus::install()` recorder's
/// default registry in the Prometheus text exposition format.
pub async fn metrics_handler() -> String {
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}
