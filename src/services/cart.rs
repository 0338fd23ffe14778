//! Saved-for-later listings.

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db::{CartEntry, CartRow, User};
use crate::storage::ImageStore;

use super::clock::Clock;
use super::error::{is_unique_violation, ServiceError, ServiceResult};

fn already_saved() -> ServiceError {
    ServiceError::Conflict("This listing is already in your cart".to_string())
}

fn to_entry(store: &dyn ImageStore, row: CartRow) -> CartEntry {
    CartEntry {
        id: row.item.id,
        listing_id: row.item.listing_id,
        promo_code: row.item.promo_code,
        title: row.title,
        car_model: row.car_model,
        city: row.city,
        price: row.price,
        image: row.image1.as_deref().map(|path| store.url_for(path)),
        created_at: row.item.created_at,
    }
}

const CART_SELECT: &str = r#"
    SELECT c.*, l.title, l.car_model, l.city, l.price, l.image1
    FROM carts c
    JOIN listings l ON l.id = c.listing_id
"#;

/// Save a listing for later, optionally with a promo code
pub async fn add_to_cart(
    db: &SqlitePool,
    store: &dyn ImageStore,
    clock: &dyn Clock,
    client: &User,
    listing_id: &str,
    promo_code: Option<String>,
) -> ServiceResult<CartEntry> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM listings WHERE id = ?")
        .bind(listing_id)
        .fetch_optional(db)
        .await?;
    if exists.is_none() {
        return Err(ServiceError::not_found("Listing"));
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO carts (id, listing_id, user_id, promo_code, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(listing_id)
    .bind(&client.id)
    .bind(&promo_code)
    .bind(clock.timestamp())
    .execute(db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            already_saved()
        } else {
            ServiceError::Database(e)
        }
    })?;

    let row = sqlx::query_as::<_, CartRow>(&format!("{} WHERE c.id = ?", CART_SELECT))
        .bind(&id)
        .fetch_one(db)
        .await?;

    info!(user_id = %client.id, listing_id = %listing_id, "Added listing to cart");
    Ok(to_entry(store, row))
}

/// The client's cart, most recent first
pub async fn list_cart(
    db: &SqlitePool,
    store: &dyn ImageStore,
    client: &User,
) -> ServiceResult<Vec<CartEntry>> {
    let rows = sqlx::query_as::<_, CartRow>(&format!(
        "{} WHERE c.user_id = ? ORDER BY c.created_at DESC, c.rowid DESC",
        CART_SELECT
    ))
    .bind(&client.id)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(|row| to_entry(store, row)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Role};
    use crate::services::testing;

    #[tokio::test]
    async fn test_add_and_list() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;

        let entry = add_to_cart(&pool, &store, &clock, &client, &listing.id, Some("SUMMER".to_string()))
            .await
            .unwrap();
        assert_eq!(entry.title, "Clio");
        assert_eq!(entry.promo_code.as_deref(), Some("SUMMER"));

        let cart = list_cart(&pool, &store, &client).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].listing_id, listing.id);
        assert!(list_cart(&pool, &store, &partner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_listing() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;

        add_to_cart(&pool, &store, &clock, &client, &listing.id, None).await.unwrap();
        assert!(matches!(
            add_to_cart(&pool, &store, &clock, &client, &listing.id, None).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            add_to_cart(&pool, &store, &clock, &client, "missing", None).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
