//! Listing (car announcement) models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::availability::{CatalogWindow, DaySchedule, ValidWindow};
use super::common::{empty_string_as_none, Pagination};

/// Cities a listing may be published in
pub const SUPPORTED_CITIES: [&str; 6] = [
    "Tetouan",
    "Tanger",
    "Houceima",
    "Chefchaouen",
    "Larache",
    "Ouazzane",
];

/// Premium placement lengths in days
pub const PREMIUM_DURATIONS: [i64; 2] = [7, 15];

pub const MAX_PRICE: f64 = 999_999.99;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Listing {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub car_model: String,
    pub city: String,
    pub color: String,
    pub price: f64,
    pub premium: bool,
    pub premium_duration: Option<i64>,
    pub active: bool,
    pub image1: Option<String>,
    pub image2: Option<String>,
    pub image3: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Listing {
    /// Stored image references, in slot order
    pub fn image_paths(&self) -> Vec<String> {
        [&self.image1, &self.image2, &self.image3]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// Validated listing fields, ready to persist
#[derive(Debug, Clone)]
pub struct ListingInput {
    pub title: String,
    pub description: String,
    pub car_model: String,
    pub city: String,
    pub color: String,
    pub price: f64,
    pub premium: bool,
    pub premium_duration: Option<i64>,
    pub windows: Vec<ValidWindow>,
}

/// Listing as returned to its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub car_model: String,
    pub city: String,
    pub color: String,
    pub price: f64,
    pub premium: bool,
    pub premium_duration: Option<i64>,
    pub active: bool,
    pub images: Vec<String>,
    pub availability: Vec<DaySchedule>,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing row joined with its owner for catalog queries
#[derive(Debug, Clone, FromRow)]
pub struct CatalogRow {
    #[sqlx(flatten)]
    pub listing: Listing,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub name: String,
    pub email: String,
}

/// Listing as presented in the public catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogListing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub car_model: String,
    pub city: String,
    pub color: String,
    pub price: f64,
    pub premium: bool,
    pub images: Vec<String>,
    pub owner: OwnerSummary,
    pub availability: Vec<CatalogWindow>,
    pub created_at: String,
}

/// Raw catalog query string; parsed and bounded by the handler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogParams {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub car_model: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub min_price: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub max_price: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub per_page: Option<String>,
}

/// Typed catalog filters
#[derive(Debug, Clone, Default)]
pub struct CatalogFilters {
    pub city: Option<String>,
    pub car_model: Option<String>,
    pub color: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub success: bool,
    pub data: Vec<CatalogListing>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptions {
    pub cities: Vec<String>,
    pub car_models: Vec<String>,
    pub colors: Vec<String>,
    pub price_range: PriceRange,
}
