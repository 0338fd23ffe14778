//! Partner-side listing management.
//!
//! Image files are written before the database transaction starts and removed
//! again if it fails. Files that a committed change made obsolete are removed
//! after the commit.

use bytes::Bytes;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::db::{begin_write, AvailabilityWindow, Listing, ListingInput, ListingResponse, User};
use crate::storage::{discard_images, ImageStore};
use crate::telemetry::record_listing_created;

use super::availability::{list_windows, normalize_week, replace_windows, windows_by_listing};
use super::clock::Clock;
use super::error::{ServiceError, ServiceResult};

/// An uploaded image that passed type and size checks
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub extension: String,
    pub bytes: Bytes,
}

/// Shape a listing and its windows for the partner dashboard
pub fn to_response(
    store: &dyn ImageStore,
    listing: Listing,
    windows: &[AvailabilityWindow],
) -> ListingResponse {
    let images = listing
        .image_paths()
        .iter()
        .map(|path| store.url_for(path))
        .collect();

    ListingResponse {
        id: listing.id,
        title: listing.title,
        description: listing.description,
        car_model: listing.car_model,
        city: listing.city,
        color: listing.color,
        price: listing.price,
        premium: listing.premium,
        premium_duration: listing.premium_duration,
        active: listing.active,
        images,
        availability: normalize_week(windows),
        created_at: listing.created_at,
        updated_at: listing.updated_at,
    }
}

async fn save_uploads(
    store: &dyn ImageStore,
    listing_id: &str,
    uploads: Vec<ImageUpload>,
) -> ServiceResult<Vec<String>> {
    let mut saved = Vec::with_capacity(uploads.len());
    for (slot, upload) in uploads.into_iter().enumerate() {
        match store
            .save(listing_id, slot + 1, &upload.extension, upload.bytes)
            .await
        {
            Ok(path) => saved.push(path),
            Err(e) => {
                discard_images(store, &saved).await;
                return Err(ServiceError::Storage(e));
            }
        }
    }
    Ok(saved)
}

fn image_slot(paths: &[String], index: usize) -> Option<&str> {
    paths.get(index).map(String::as_str)
}

/// Fetch a listing and check that `partner` owns it
async fn owned_listing(
    conn: &mut SqliteConnection,
    partner: &User,
    listing_id: &str,
) -> ServiceResult<Listing> {
    let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Listing"))?;

    if listing.user_id != partner.id {
        return Err(ServiceError::Authorization(
            "You do not own this listing".to_string(),
        ));
    }
    Ok(listing)
}

async fn insert_listing(
    db: &SqlitePool,
    clock: &dyn Clock,
    partner: &User,
    id: &str,
    input: &ListingInput,
    images: &[String],
) -> ServiceResult<(Listing, Vec<AvailabilityWindow>)> {
    let now = clock.timestamp();
    let mut tx = begin_write(db).await?;

    sqlx::query(
        r#"
        INSERT INTO listings (id, user_id, title, description, car_model, city, color, price,
                              premium, premium_duration, active, image1, image2, image3,
                              created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&partner.id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.car_model)
    .bind(&input.city)
    .bind(&input.color)
    .bind(input.price)
    .bind(input.premium)
    .bind(input.premium_duration)
    .bind(image_slot(images, 0))
    .bind(image_slot(images, 1))
    .bind(image_slot(images, 2))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    replace_windows(&mut tx, clock, id, &input.windows).await?;

    let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    let windows = list_windows(&mut tx, id).await?;

    tx.commit().await?;
    Ok((listing, windows))
}

/// Create a listing with its windows and images
pub async fn create_listing(
    db: &SqlitePool,
    store: &dyn ImageStore,
    clock: &dyn Clock,
    partner: &User,
    input: ListingInput,
    uploads: Vec<ImageUpload>,
) -> ServiceResult<ListingResponse> {
    let id = Uuid::new_v4().to_string();
    let images = save_uploads(store, &id, uploads).await?;

    match insert_listing(db, clock, partner, &id, &input, &images).await {
        Ok((listing, windows)) => {
            record_listing_created();
            info!(
                listing_id = %listing.id,
                user_id = %partner.id,
                windows = windows.len(),
                images = images.len(),
                "Created listing"
            );
            Ok(to_response(store, listing, &windows))
        }
        Err(e) => {
            discard_images(store, &images).await;
            Err(e)
        }
    }
}

async fn apply_update(
    db: &SqlitePool,
    clock: &dyn Clock,
    partner: &User,
    listing_id: &str,
    input: &ListingInput,
    new_images: Option<&[String]>,
) -> ServiceResult<(Listing, Listing, Vec<AvailabilityWindow>)> {
    let mut tx = begin_write(db).await?;

    let previous = owned_listing(&mut tx, partner, listing_id).await?;

    let (image1, image2, image3) = match new_images {
        Some(paths) => (
            image_slot(paths, 0).map(str::to_string),
            image_slot(paths, 1).map(str::to_string),
            image_slot(paths, 2).map(str::to_string),
        ),
        None => (
            previous.image1.clone(),
            previous.image2.clone(),
            previous.image3.clone(),
        ),
    };

    let result = sqlx::query(
        r#"
        UPDATE listings
        SET title = ?, description = ?, car_model = ?, city = ?, color = ?, price = ?,
            premium = ?, premium_duration = ?, image1 = ?, image2 = ?, image3 = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.car_model)
    .bind(&input.city)
    .bind(&input.color)
    .bind(input.price)
    .bind(input.premium)
    .bind(input.premium_duration)
    .bind(image1)
    .bind(image2)
    .bind(image3)
    .bind(clock.timestamp())
    .bind(listing_id)
    .bind(&partner.id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Listing"));
    }

    replace_windows(&mut tx, clock, listing_id, &input.windows).await?;

    let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
        .bind(listing_id)
        .fetch_one(&mut *tx)
        .await?;
    let windows = list_windows(&mut tx, listing_id).await?;

    tx.commit().await?;
    Ok((previous, listing, windows))
}

/// Replace a listing's fields and week. Images are only replaced when new
/// ones are supplied.
pub async fn update_listing(
    db: &SqlitePool,
    store: &dyn ImageStore,
    clock: &dyn Clock,
    partner: &User,
    listing_id: &str,
    input: ListingInput,
    uploads: Vec<ImageUpload>,
) -> ServiceResult<ListingResponse> {
    let replacing_images = !uploads.is_empty();
    let new_images = save_uploads(store, listing_id, uploads).await?;

    let outcome = apply_update(
        db,
        clock,
        partner,
        listing_id,
        &input,
        replacing_images.then_some(new_images.as_slice()),
    )
    .await;

    match outcome {
        Ok((previous, listing, windows)) => {
            if replacing_images {
                discard_images(store, &previous.image_paths()).await;
            }
            info!(
                listing_id = %listing.id,
                user_id = %partner.id,
                windows = windows.len(),
                replaced_images = replacing_images,
                "Updated listing"
            );
            Ok(to_response(store, listing, &windows))
        }
        Err(e) => {
            discard_images(store, &new_images).await;
            Err(e)
        }
    }
}

/// Delete a listing, its windows and cart entries, then its image files.
///
/// Refused while the listing has pending or accepted bookings. Older
/// bookings keep their snapshot and lose the reference.
pub async fn delete_listing(
    db: &SqlitePool,
    store: &dyn ImageStore,
    partner: &User,
    listing_id: &str,
) -> ServiceResult<()> {
    let mut tx = begin_write(db).await?;

    let listing = owned_listing(&mut tx, partner, listing_id).await?;

    let open_bookings: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bookings WHERE listing_id = ? AND state IN ('pending', 'accepted')",
    )
    .bind(listing_id)
    .fetch_one(&mut *tx)
    .await?;
    if open_bookings > 0 {
        return Err(ServiceError::Conflict(
            "This listing has pending or accepted bookings and cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM carts WHERE listing_id = ?")
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;
    let windows = sqlx::query("DELETE FROM availability_windows WHERE listing_id = ?")
        .bind(listing_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM listings WHERE id = ?")
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let images = listing.image_paths();
    discard_images(store, &images).await;

    info!(
        listing_id = %listing_id,
        user_id = %partner.id,
        windows,
        images = images.len(),
        "Deleted listing"
    );
    Ok(())
}

/// The partner's listings, newest first
pub async fn list_partner_listings(
    db: &SqlitePool,
    store: &dyn ImageStore,
    partner: &User,
) -> ServiceResult<Vec<ListingResponse>> {
    let listings = sqlx::query_as::<_, Listing>(
        "SELECT * FROM listings WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(&partner.id)
    .fetch_all(db)
    .await?;

    let ids: Vec<String> = listings.iter().map(|l| l.id.clone()).collect();
    let mut windows = windows_by_listing(db, &ids).await?;

    Ok(listings
        .into_iter()
        .map(|listing| {
            let week = windows.remove(&listing.id).unwrap_or_default();
            to_response(store, listing, &week)
        })
        .collect())
}

/// Show or hide a listing in the catalog
pub async fn set_listing_status(
    db: &SqlitePool,
    store: &dyn ImageStore,
    clock: &dyn Clock,
    partner: &User,
    listing_id: &str,
    active: bool,
) -> ServiceResult<ListingResponse> {
    let mut tx = begin_write(db).await?;

    owned_listing(&mut tx, partner, listing_id).await?;

    sqlx::query("UPDATE listings SET active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(clock.timestamp())
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;

    let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
        .bind(listing_id)
        .fetch_one(&mut *tx)
        .await?;
    let windows = list_windows(&mut tx, listing_id).await?;

    tx.commit().await?;

    info!(listing_id = %listing_id, active, "Updated listing status");
    Ok(to_response(store, listing, &windows))
}
