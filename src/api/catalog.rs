//! Public catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::db::{CatalogPage, CatalogParams, DaySchedule, FilterOptions};
use crate::services::{availability, catalog, catalog::CatalogQuery};
use crate::AppState;

use super::error::ApiError;
use super::response::{ApiResponse, ApiResult};

/// GET /api/listings
///
/// Returns `{success, data, pagination}` with `pagination` next to `data`.
pub async fn list_listings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<CatalogPage>, ApiError> {
    let query = CatalogQuery::from_params(params, &state.config.catalog)?;
    let (data, pagination) =
        catalog::list_active_listings(&state.db, state.images.as_ref(), &query).await?;

    Ok(Json(CatalogPage {
        success: true,
        data,
        pagination,
    }))
}

/// GET /api/listings/filters
pub async fn filter_options(State(state): State<Arc<AppState>>) -> ApiResult<FilterOptions> {
    Ok(ApiResponse::ok(catalog::filter_options(&state.db).await?))
}

/// GET /api/listings/:id/availability
pub async fn listing_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<DaySchedule>> {
    Ok(ApiResponse::ok(
        availability::list_availability(&state.db, &id).await?,
    ))
}
