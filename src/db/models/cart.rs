//! Cart (saved-for-later) models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub id: String,
    pub listing_id: String,
    pub user_id: String,
    pub promo_code: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddToCartRequest {
    pub listing_id: String,
    pub promo_code: Option<String>,
}

/// Cart row joined with the saved listing
#[derive(Debug, Clone, FromRow)]
pub struct CartRow {
    #[sqlx(flatten)]
    pub item: CartItem,
    pub title: String,
    pub car_model: String,
    pub city: String,
    pub price: f64,
    pub image1: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartEntry {
    pub id: String,
    pub listing_id: String,
    pub promo_code: Option<String>,
    pub title: String,
    pub car_model: String,
    pub city: String,
    pub price: f64,
    pub image: Option<String>,
    pub created_at: String,
}
