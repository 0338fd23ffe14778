//! Weekly availability windows attached to a listing.

use std::collections::{HashMap, HashSet};

use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::db::{
    begin_write, format_time, parse_time, AvailabilityWindow, Day, DaySchedule, Listing, User,
    ValidWindow, WindowInput,
};

use super::clock::Clock;
use super::error::{FieldErrors, ServiceError, ServiceResult};

fn push_error(errors: &mut FieldErrors, field: String, message: impl Into<String>) {
    errors.entry(field).or_default().push(message.into());
}

/// Validate a submitted week. Unselected days are ignored; each selected day
/// needs an `HH:MM` pair with `from` strictly before `to`.
pub fn validate_windows(input: &[WindowInput]) -> Result<Vec<ValidWindow>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut seen = HashSet::new();
    let mut windows = Vec::new();

    for (index, entry) in input.iter().enumerate() {
        let day: Day = match entry.day.parse() {
            Ok(day) => day,
            Err(e) => {
                push_error(&mut errors, format!("availability.{}.day", index), e);
                continue;
            }
        };

        if !seen.insert(day) {
            push_error(
                &mut errors,
                format!("availability.{}.day", day),
                "Each day may only appear once.",
            );
            continue;
        }

        if !entry.selected {
            continue;
        }

        let from = entry.from.as_deref().and_then(parse_time);
        let to = entry.to.as_deref().and_then(parse_time);

        match (from, to) {
            (Some(from), Some(to)) if from < to => windows.push(ValidWindow { day, from, to }),
            (Some(_), Some(_)) => push_error(
                &mut errors,
                format!("availability.{}.to", day),
                "The end time must be after the start time.",
            ),
            (from, to) => {
                if from.is_none() {
                    push_error(
                        &mut errors,
                        format!("availability.{}.from", day),
                        "A valid start time (HH:MM) is required for a selected day.",
                    );
                }
                if to.is_none() {
                    push_error(
                        &mut errors,
                        format!("availability.{}.to", day),
                        "A valid end time (HH:MM) is required for a selected day.",
                    );
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    windows.sort_by_key(|w| (w.day, w.from));
    Ok(windows)
}

/// Discard every window of the listing and insert `windows`.
///
/// Runs on the caller's connection so it joins the caller's transaction.
pub async fn replace_windows(
    conn: &mut SqliteConnection,
    clock: &dyn Clock,
    listing_id: &str,
    windows: &[ValidWindow],
) -> ServiceResult<()> {
    sqlx::query("DELETE FROM availability_windows WHERE listing_id = ?")
        .bind(listing_id)
        .execute(&mut *conn)
        .await?;

    let now = clock.timestamp();
    for window in windows {
        sqlx::query(
            r#"
            INSERT INTO availability_windows (id, listing_id, day, time_from, time_to, active, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(listing_id)
        .bind(window.day.as_str())
        .bind(format_time(window.from))
        .bind(format_time(window.to))
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Windows of one listing in week order
pub async fn list_windows(
    conn: &mut SqliteConnection,
    listing_id: &str,
) -> ServiceResult<Vec<AvailabilityWindow>> {
    let mut windows = sqlx::query_as::<_, AvailabilityWindow>(
        "SELECT * FROM availability_windows WHERE listing_id = ?",
    )
    .bind(listing_id)
    .fetch_all(&mut *conn)
    .await?;

    sort_windows(&mut windows);
    Ok(windows)
}

/// Windows of several listings at once, grouped by listing id
pub async fn windows_by_listing(
    db: &SqlitePool,
    listing_ids: &[String],
) -> ServiceResult<HashMap<String, Vec<AvailabilityWindow>>> {
    let mut grouped: HashMap<String, Vec<AvailabilityWindow>> = HashMap::new();
    if listing_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders = vec!["?"; listing_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM availability_windows WHERE listing_id IN ({})",
        placeholders
    );
    let mut query = sqlx::query_as::<_, AvailabilityWindow>(&sql);
    for id in listing_ids {
        query = query.bind(id);
    }

    for window in query.fetch_all(db).await? {
        grouped.entry(window.listing_id.clone()).or_default().push(window);
    }
    for windows in grouped.values_mut() {
        sort_windows(windows);
    }
    Ok(grouped)
}

fn sort_windows(windows: &mut [AvailabilityWindow]) {
    windows.sort_by(|a, b| {
        (a.day_enum(), &a.time_from).cmp(&(b.day_enum(), &b.time_from))
    });
}

/// Expand persisted windows into a full Monday..Sunday week.
///
/// Days without a window come back unselected with empty times. When a day
/// has several windows the earliest one is shown.
pub fn normalize_week(windows: &[AvailabilityWindow]) -> Vec<DaySchedule> {
    Day::ALL
        .into_iter()
        .map(|day| {
            windows
                .iter()
                .filter(|w| w.day_enum() == Some(day))
                .min_by(|a, b| a.time_from.cmp(&b.time_from))
                .map(|w| DaySchedule {
                    day,
                    selected: true,
                    from: w.time_from.clone(),
                    to: w.time_to.clone(),
                })
                .unwrap_or_else(|| DaySchedule::empty(day))
        })
        .collect()
}

/// The normalized week of a listing
pub async fn list_availability(db: &SqlitePool, listing_id: &str) -> ServiceResult<Vec<DaySchedule>> {
    let mut conn = db.acquire().await?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM listings WHERE id = ?")
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(ServiceError::not_found("Listing"));
    }

    let windows = list_windows(&mut conn, listing_id).await?;
    Ok(normalize_week(&windows))
}

/// Toggle one window. Only the owner of the listing may do so.
pub async fn set_window_status(
    db: &SqlitePool,
    clock: &dyn Clock,
    partner: &User,
    window_id: &str,
    active: bool,
) -> ServiceResult<AvailabilityWindow> {
    let mut tx = begin_write(db).await?;

    let window = sqlx::query_as::<_, AvailabilityWindow>(
        "SELECT * FROM availability_windows WHERE id = ?",
    )
    .bind(window_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ServiceError::not_found("Availability window"))?;

    let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
        .bind(&window.listing_id)
        .fetch_one(&mut *tx)
        .await?;
    if listing.user_id != partner.id {
        return Err(ServiceError::Authorization(
            "You do not own this listing".to_string(),
        ));
    }

    sqlx::query("UPDATE availability_windows SET active = ? WHERE id = ?")
        .bind(active)
        .bind(window_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE listings SET updated_at = ? WHERE id = ?")
        .bind(clock.timestamp())
        .bind(&listing.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(window_id = %window_id, listing_id = %listing.id, active, "Updated window status");
    Ok(AvailabilityWindow { active, ..window })
}
