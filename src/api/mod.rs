pub mod auth;
pub mod bookings;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod listings;
pub mod metrics;
pub mod rate_limit;
pub mod response;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Room for the text fields sent next to the images
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes, with the stricter rate limit tier
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Public catalog
    let catalog_routes = Router::new()
        .route("/listings", get(catalog::list_listings))
        .route("/listings/filters", get(catalog::filter_options))
        .route(
            "/listings/:id/availability",
            get(catalog::listing_availability),
        );

    // Partner routes; the role is checked by the `Partner` extractor
    let storage = &state.config.storage;
    let upload_limit = storage.max_images * storage.max_image_bytes + FORM_OVERHEAD_BYTES;
    let partner_routes = Router::new()
        .route(
            "/listings",
            get(listings::list_listings).post(listings::create_listing),
        )
        .route(
            "/listings/:id",
            put(listings::update_listing).delete(listings::delete_listing),
        )
        .route("/listings/:id/status", put(listings::set_listing_status))
        .route("/windows/:id/status", put(listings::set_window_status))
        .route("/bookings", get(bookings::list_partner_bookings))
        .route(
            "/bookings/:id/status",
            put(bookings::update_booking_status),
        )
        .layer(DefaultBodyLimit::max(upload_limit));

    // Client routes; the role is checked by the `Client` extractor
    let client_routes = Router::new()
        .route(
            "/bookings",
            get(bookings::list_client_bookings).post(bookings::create_booking),
        )
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/cart", get(cart::list_cart).post(cart::add_to_cart));

    let api_routes = Router::new()
        .merge(catalog_routes)
        .nest("/partner", partner_routes)
        .nest("/client", client_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::expose_error_details,
        ))
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "message": "API endpoint not found",
        })),
    )
}
