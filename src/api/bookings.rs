//! Booking endpoints for clients and partners.

use axum::extract::{Path, State};
use std::sync::Arc;

use crate::db::{
    BookingAction, BookingResponse, CreateBookingRequest, PartnerBookingResponse,
    UpdateBookingStatusRequest,
};
use crate::services::bookings;
use crate::AppState;

use super::auth::{Client, Partner};
use super::error::{ApiError, ValidationErrorBuilder};
use super::rate_limit::guard_booking;
use super::response::{ApiJson, ApiResponse, ApiResult};
use super::validation::{parse_booking_date, validate_text};

/// GET /api/client/bookings
pub async fn list_client_bookings(
    State(state): State<Arc<AppState>>,
    Client(client): Client,
) -> ApiResult<Vec<BookingResponse>> {
    Ok(ApiResponse::ok(
        bookings::list_user_bookings(&state.db, &client).await?,
    ))
}

/// POST /api/client/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Client(client): Client,
    ApiJson(req): ApiJson<CreateBookingRequest>,
) -> ApiResult<BookingResponse> {
    guard_booking(&state.rate_limiter, &client)?;

    let mut errors = ValidationErrorBuilder::new();
    errors.check("window_id", validate_text(&req.window_id, "window id", 64));
    let date = errors.parsed("date", parse_booking_date(&req.date).map(Some));
    errors.finish()?;
    let date = date.ok_or_else(|| ApiError::validation_field("date", "The date field is required."))?;

    let booking = bookings::create_booking(
        &state.db,
        state.images.as_ref(),
        state.clock.as_ref(),
        &client,
        req.window_id.trim(),
        date,
    )
    .await?;

    Ok(ApiResponse::created("Booking request sent successfully", booking))
}

/// POST /api/client/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Client(client): Client,
    Path(id): Path<String>,
) -> ApiResult<BookingResponse> {
    let booking =
        bookings::cancel_booking(&state.db, state.clock.as_ref(), &client, &id).await?;
    Ok(ApiResponse::ok(booking).with_message("Booking cancelled successfully"))
}

/// GET /api/partner/bookings
pub async fn list_partner_bookings(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
) -> ApiResult<Vec<PartnerBookingResponse>> {
    Ok(ApiResponse::ok(
        bookings::list_partner_bookings(&state.db, &partner).await?,
    ))
}

/// PUT /api/partner/bookings/:id/status
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateBookingStatusRequest>,
) -> ApiResult<BookingResponse> {
    let action: BookingAction = req
        .action
        .parse()
        .map_err(|_| ApiError::validation_field("action", "The action must be accept or reject."))?;

    let booking = bookings::update_booking_status(
        &state.db,
        state.clock.as_ref(),
        &partner,
        &id,
        action,
    )
    .await?;

    Ok(ApiResponse::ok(booking).with_message(format!("Booking {}", booking_verb(action))))
}

fn booking_verb(action: BookingAction) -> &'static str {
    match action {
        BookingAction::Accept => "accepted",
        BookingAction::Reject => "rejected",
    }
}
