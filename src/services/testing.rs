//! Fixtures shared by the service tests.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::config::AuthConfig;
use crate::db::{Day, ListingInput, ListingResponse, Role, User, ValidWindow};
use crate::storage::LocalImageStore;

use super::clock::ManualClock;
use super::identity::{self, NewUser};
use super::listings::create_listing;

/// Monday 2026-10-19 09:00 UTC
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

pub fn clock() -> ManualClock {
    ManualClock::new(start())
}

pub fn next_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 26).unwrap()
}

/// Image store for tests that never upload
pub fn store() -> LocalImageStore {
    LocalImageStore::new(std::env::temp_dir().join("autoloc-unused"), "/storage")
}

pub async fn user(pool: &SqlitePool, email: &str, role: Role) -> User {
    let (user, _) = identity::register(
        pool,
        &clock(),
        &AuthConfig::default(),
        NewUser {
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            country: "Morocco".to_string(),
            city: "Tetouan".to_string(),
            job: "Tester".to_string(),
            description: None,
            role,
            password: "password123".to_string(),
        },
    )
    .await
    .unwrap();
    user
}

/// Renault Clio in Tanger at 350/day, available Monday 09:00-17:00
pub fn listing_input(title: &str, premium: bool) -> ListingInput {
    ListingInput {
        title: title.to_string(),
        description: "Clean, air conditioned, unlimited mileage".to_string(),
        car_model: "Renault Clio".to_string(),
        city: "Tanger".to_string(),
        color: "#FF0000".to_string(),
        price: 350.0,
        premium,
        premium_duration: premium.then_some(7),
        windows: vec![ValidWindow {
            day: Day::Monday,
            from: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            to: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }],
    }
}

pub async fn listing(
    pool: &SqlitePool,
    clock: &ManualClock,
    partner: &User,
    title: &str,
    premium: bool,
) -> ListingResponse {
    create_listing(
        pool,
        &store(),
        clock,
        partner,
        listing_input(title, premium),
        Vec::new(),
    )
    .await
    .unwrap()
}

/// Id of the first window of a listing
pub async fn window_id(pool: &SqlitePool, listing_id: &str) -> String {
    sqlx::query_scalar("SELECT id FROM availability_windows WHERE listing_id = ? LIMIT 1")
        .bind(listing_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
