//! Weekly availability windows attached to a listing.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::Day;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailabilityWindow {
    pub id: String,
    pub listing_id: String,
    pub day: String,
    pub time_from: String,
    pub time_to: String,
    pub active: bool,
    pub created_at: String,
}

impl AvailabilityWindow {
    pub fn day_enum(&self) -> Option<Day> {
        self.day.parse().ok()
    }
}

/// One day of a submitted schedule, as sent by the listing form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowInput {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// A selected day whose time range has been validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidWindow {
    pub day: Day,
    pub from: NaiveTime,
    pub to: NaiveTime,
}

/// Presentation shape of one day in a listing's week
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySchedule {
    pub day: Day,
    pub selected: bool,
    pub from: String,
    pub to: String,
}

impl DaySchedule {
    pub fn empty(day: Day) -> Self {
        Self {
            day,
            selected: false,
            from: String::new(),
            to: String::new(),
        }
    }
}

/// Window as exposed in the catalog, with its bookable flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogWindow {
    pub id: String,
    pub day: String,
    pub from: String,
    pub to: String,
    pub available: bool,
}

impl From<AvailabilityWindow> for CatalogWindow {
    fn from(w: AvailabilityWindow) -> Self {
        Self {
            id: w.id,
            day: w.day,
            from: w.time_from,
            to: w.time_to,
            available: w.active,
        }
    }
}

/// Request to toggle a listing or a window
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub active: bool,
}
