//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::telemetry::{BOOKINGS_TOTAL, LISTINGS_TOTAL};
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ACTIVE_LISTINGS: &str = "active_listings";
pub const USERS_TOTAL: &str = "users_total";

/// Initialize the Prometheus metrics recorder and return a handle for rendering metrics.
///
/// This should be called once during application startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Register metric descriptions
    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(LISTINGS_TOTAL, "Total number of listings created");
    describe_counter!(
        BOOKINGS_TOTAL,
        "Booking state changes by resulting state (pending/accepted/rejected/cancelled)"
    );
    describe_gauge!(ACTIVE_LISTINGS, "Number of listings visible in the catalog");
    describe_gauge!(USERS_TOTAL, "Number of registered accounts");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Refresh the gauges from the database before rendering
async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE active = 1")
            .fetch_one(&state.db)
            .await
    {
        gauge!(ACTIVE_LISTINGS).set(count as f64);
    }

    if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
    {
        gauge!(USERS_TOTAL).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the matched route template so ids do not explode label cardinality
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}
