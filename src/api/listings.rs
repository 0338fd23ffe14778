//! Partner listing management, including multipart image upload.

use axum::extract::{Multipart, Path, State};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::db::{AvailabilityWindow, ListingInput, ListingResponse, StatusRequest, WindowInput};
use crate::services::{availability, listings, listings::ImageUpload};
use crate::AppState;

use super::auth::Partner;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::{ApiJson, ApiResponse, ApiResult};
use super::validation::{
    image_extension, parse_bool, parse_premium_duration, parse_price, validate_city,
    validate_color, validate_image_size, validate_text,
};

/// Raw multipart listing submission
#[derive(Debug, Default)]
struct ListingForm {
    title: String,
    description: String,
    car_model: String,
    city: String,
    color: String,
    price: String,
    premium: String,
    premium_duration: Option<String>,
    availability: Option<String>,
    images: Vec<ImageUpload>,
    image_errors: Vec<String>,
}

impl ListingForm {
    async fn parse(multipart: &mut Multipart, storage: &StorageConfig) -> Result<Self, ApiError> {
        let mut form = ListingForm::default();
        let mut image_count = 0usize;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "images" || name == "images[]" {
                let extension = image_extension(field.file_name(), field.content_type());
                let bytes = field.bytes().await?;

                // An empty file input still sends a part
                if bytes.is_empty() {
                    continue;
                }
                image_count += 1;
                if image_count > storage.max_images {
                    continue;
                }

                match (extension, validate_image_size(bytes.len(), storage.max_image_bytes)) {
                    (Ok(extension), Ok(())) => form.images.push(ImageUpload { extension, bytes }),
                    (Err(message), _) | (_, Err(message)) => form.image_errors.push(message),
                }
                continue;
            }

            let value = field.text().await?;
            match name.as_str() {
                "title" => form.title = value,
                "description" => form.description = value,
                "car_model" => form.car_model = value,
                "city" => form.city = value,
                "color" => form.color = value,
                "price" => form.price = value,
                "premium" => form.premium = value,
                "premium_duration" => form.premium_duration = Some(value),
                "availability" => form.availability = Some(value),
                _ => {}
            }
        }

        if image_count > storage.max_images {
            form.image_errors.push(format!(
                "You may upload at most {} images.",
                storage.max_images
            ));
        }

        Ok(form)
    }

    /// Validate every field and return the typed input with accepted images
    fn validate(self) -> Result<(ListingInput, Vec<ImageUpload>), ApiError> {
        let mut errors = ValidationErrorBuilder::new();

        let title = self.title.trim().to_string();
        let description = self.description.trim().to_string();
        let car_model = self.car_model.trim().to_string();
        let city = self.city.trim().to_string();
        let color = self.color.trim().to_string();

        errors.check("title", validate_text(&title, "title", 255));
        errors.check("description", validate_text(&description, "description", 1000));
        errors.check("car_model", validate_text(&car_model, "car model", 255));
        errors.check("city", validate_city(&city));
        errors.check("color", validate_color(&color));

        let price = errors.parsed("price", parse_price(&self.price));
        let premium = errors.parsed("premium", parse_bool(&self.premium));
        let premium_duration = errors.parsed(
            "premium_duration",
            parse_premium_duration(premium, self.premium_duration.as_deref()),
        );

        let windows = match self.availability.as_deref().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<WindowInput>>(raw) {
                Ok(input) => match availability::validate_windows(&input) {
                    Ok(windows) => windows,
                    Err(field_errors) => {
                        errors.extend(field_errors);
                        Vec::new()
                    }
                },
                Err(_) => {
                    errors.add(
                        "availability",
                        "The availability must be a JSON list of {day, selected, from, to}.",
                    );
                    Vec::new()
                }
            },
        };

        for message in self.image_errors {
            errors.add("images", message);
        }

        errors.finish()?;

        Ok((
            ListingInput {
                title,
                description,
                car_model,
                city,
                color,
                price,
                premium,
                premium_duration,
                windows,
            },
            self.images,
        ))
    }
}

/// GET /api/partner/listings
pub async fn list_listings(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
) -> ApiResult<Vec<ListingResponse>> {
    let listings = listings::list_partner_listings(&state.db, state.images.as_ref(), &partner).await?;
    Ok(ApiResponse::ok(listings))
}

/// POST /api/partner/listings
pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
    mut multipart: Multipart,
) -> ApiResult<ListingResponse> {
    let (input, images) = ListingForm::parse(&mut multipart, &state.config.storage)
        .await?
        .validate()?;

    let listing = listings::create_listing(
        &state.db,
        state.images.as_ref(),
        state.clock.as_ref(),
        &partner,
        input,
        images,
    )
    .await?;

    Ok(ApiResponse::created("Listing created successfully", listing))
}

/// PUT /api/partner/listings/:id
pub async fn update_listing(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<ListingResponse> {
    let (input, images) = ListingForm::parse(&mut multipart, &state.config.storage)
        .await?
        .validate()?;

    let listing = listings::update_listing(
        &state.db,
        state.images.as_ref(),
        state.clock.as_ref(),
        &partner,
        &id,
        input,
        images,
    )
    .await?;

    Ok(ApiResponse::ok(listing).with_message("Listing updated successfully"))
}

/// DELETE /api/partner/listings/:id
pub async fn delete_listing(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
    Path(id): Path<String>,
) -> ApiResult<()> {
    listings::delete_listing(&state.db, state.images.as_ref(), &partner, &id).await?;
    Ok(ApiResponse::message("Listing deleted successfully"))
}

/// PUT /api/partner/listings/:id/status
pub async fn set_listing_status(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<ListingResponse> {
    let listing = listings::set_listing_status(
        &state.db,
        state.images.as_ref(),
        state.clock.as_ref(),
        &partner,
        &id,
        req.active,
    )
    .await?;
    Ok(ApiResponse::ok(listing))
}

/// PUT /api/partner/windows/:id/status
pub async fn set_window_status(
    State(state): State<Arc<AppState>>,
    Partner(partner): Partner,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<AvailabilityWindow> {
    let window = availability::set_window_status(
        &state.db,
        state.clock.as_ref(),
        &partner,
        &id,
        req.active,
    )
    .await?;
    Ok(ApiResponse::ok(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Day;

    fn form() -> ListingForm {
        ListingForm {
            title: "Dacia Logan".to_string(),
            description: "Diesel, 5 seats".to_string(),
            car_model: "Logan".to_string(),
            city: "Tanger".to_string(),
            color: "#FFFFFF".to_string(),
            price: "250".to_string(),
            premium: "1".to_string(),
            premium_duration: Some("15".to_string()),
            availability: Some(
                r#"[{"day":"monday","selected":true,"from":"09:00","to":"17:00"},
                    {"day":"tuesday","selected":false}]"#
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_form() {
        let (input, images) = form().validate().unwrap();
        assert_eq!(input.price, 250.0);
        assert!(input.premium);
        assert_eq!(input.premium_duration, Some(15));
        assert_eq!(input.windows.len(), 1);
        assert_eq!(input.windows[0].day, Day::Monday);
        assert!(images.is_empty());
    }

    #[test]
    fn test_invalid_form_collects_field_errors() {
        let mut f = form();
        f.city = "Paris".to_string();
        f.price = "-3".to_string();
        f.premium_duration = None;
        f.availability = Some(r#"[{"day":"monday","selected":true,"from":"18:00","to":"09:00"}]"#.to_string());
        f.image_errors.push("Each image must be a file of type: jpeg, jpg, png.".to_string());

        let err = f.validate().unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_malformed_availability() {
        let mut f = form();
        f.availability = Some("monday 9-5".to_string());
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_non_premium_drops_duration() {
        let mut f = form();
        f.premium = "0".to_string();
        let (input, _) = f.validate().unwrap();
        assert_eq!(input.premium_duration, None);
    }
}
