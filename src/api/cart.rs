//! Client cart endpoints.

use axum::extract::State;
use std::sync::Arc;

use crate::db::{AddToCartRequest, CartEntry};
use crate::services::cart;
use crate::AppState;

use super::auth::Client;
use super::error::ValidationErrorBuilder;
use super::response::{ApiJson, ApiResponse, ApiResult};
use super::validation::validate_text;

const MAX_PROMO_CODE: usize = 50;

/// GET /api/client/cart
pub async fn list_cart(
    State(state): State<Arc<AppState>>,
    Client(client): Client,
) -> ApiResult<Vec<CartEntry>> {
    Ok(ApiResponse::ok(
        cart::list_cart(&state.db, state.images.as_ref(), &client).await?,
    ))
}

/// POST /api/client/cart
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Client(client): Client,
    ApiJson(req): ApiJson<AddToCartRequest>,
) -> ApiResult<CartEntry> {
    let promo_code = req
        .promo_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    let mut errors = ValidationErrorBuilder::new();
    errors.check("listing_id", validate_text(&req.listing_id, "listing id", 64));
    if let Some(code) = &promo_code {
        errors.check("promo_code", validate_text(code, "promo code", MAX_PROMO_CODE));
    }
    errors.finish()?;

    let entry = cart::add_to_cart(
        &state.db,
        state.images.as_ref(),
        state.clock.as_ref(),
        &client,
        req.listing_id.trim(),
        promo_code,
    )
    .await?;

    Ok(ApiResponse::created("Listing added to cart", entry))
}
