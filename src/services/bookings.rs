//! The booking ledger: rental requests against availability windows.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::db::{
    begin_write, AvailabilityWindow, Booking, BookingAction, BookingResponse, BookingState,
    CarDetails, ClientSummary, Day, Listing, PartnerBookingResponse, PartnerBookingRow, TimeSlot,
    User,
};
use crate::storage::ImageStore;
use crate::telemetry::record_booking;

use super::clock::Clock;
use super::error::{is_unique_violation, ServiceError, ServiceResult};

fn duplicate_booking() -> ServiceError {
    ServiceError::Conflict("You already have a booking for this slot on this date".to_string())
}

pub fn to_response(booking: Booking) -> BookingResponse {
    let state = booking.state_enum();
    BookingResponse {
        id: booking.id,
        window_id: booking.window_id,
        listing_id: booking.listing_id,
        date: booking.date,
        day: booking.day_name,
        state,
        feedback_client: booking.feedback_client,
        feedback_article: booking.feedback_article,
        car_details: CarDetails {
            title: booking.listing_title,
            car_model: booking.car_model,
            city: booking.city,
            price: booking.price,
            image: booking.image,
        },
        time_slot: TimeSlot {
            from: booking.time_from,
            to: booking.time_to,
        },
        created_at: booking.created_at,
    }
}

async fn fetch_booking(conn: &mut SqliteConnection, booking_id: &str) -> ServiceResult<Booking> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Booking"))
}

/// Move a booking out of `from`. Fails if another request moved it first.
async fn transition(
    conn: &mut SqliteConnection,
    clock: &dyn Clock,
    booking_id: &str,
    from: BookingState,
    to: BookingState,
) -> ServiceResult<()> {
    let result = sqlx::query("UPDATE bookings SET state = ?, updated_at = ? WHERE id = ? AND state = ?")
        .bind(to.as_str())
        .bind(clock.timestamp())
        .bind(booking_id)
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::InvalidState(format!(
            "Booking is no longer {}",
            from
        )));
    }
    Ok(())
}

/// Request `window_id` on `date` for `client`.
///
/// The window and its listing are snapshotted into the booking, so the
/// request stays readable after the schedule changes.
pub async fn create_booking(
    db: &SqlitePool,
    store: &dyn ImageStore,
    clock: &dyn Clock,
    client: &User,
    window_id: &str,
    date: NaiveDate,
) -> ServiceResult<BookingResponse> {
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

    if !window.active || !listing.active {
        return Err(ServiceError::Unavailable(
            "This time slot is not available for booking".to_string(),
        ));
    }

    if date < clock.today() {
        return Err(ServiceError::invalid_field(
            "date",
            "The date must be today or later.",
        ));
    }
    let day = Day::of_date(date);
    if window.day_enum() != Some(day) {
        return Err(ServiceError::invalid_field(
            "date",
            format!("The date must fall on a {}.", window.day),
        ));
    }

    let date = date.format("%Y-%m-%d").to_string();

    let open: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM bookings
        WHERE window_id = ? AND user_id = ? AND date = ? AND state <> 'cancelled'
        "#,
    )
    .bind(window_id)
    .bind(&client.id)
    .bind(&date)
    .fetch_one(&mut *tx)
    .await?;
    if open > 0 {
        return Err(duplicate_booking());
    }

    let id = Uuid::new_v4().to_string();
    let now = clock.timestamp();
    let image = listing.image1.as_deref().map(|path| store.url_for(path));

    sqlx::query(
        r#"
        INSERT INTO bookings (id, window_id, listing_id, user_id, owner_id, date, day_name,
                              time_from, time_to, listing_title, car_model, city, price, image,
                              state, feedback_client, feedback_article, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 'pending', 'pending', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&window.id)
    .bind(&listing.id)
    .bind(&client.id)
    .bind(&listing.user_id)
    .bind(&date)
    .bind(day.as_str())
    .bind(&window.time_from)
    .bind(&window.time_to)
    .bind(&listing.title)
    .bind(&listing.car_model)
    .bind(&listing.city)
    .bind(listing.price)
    .bind(&image)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            duplicate_booking()
        } else {
            ServiceError::Database(e)
        }
    })?;

    let booking = fetch_booking(&mut tx, &id).await?;
    tx.commit().await?;

    record_booking(BookingState::Pending);
    info!(
        booking_id = %booking.id,
        user_id = %client.id,
        window_id = %window_id,
        date = %booking.date,
        "Created booking"
    );
    Ok(to_response(booking))
}

/// Cancel a pending booking on behalf of the client who made it
pub async fn cancel_booking(
    db: &SqlitePool,
    clock: &dyn Clock,
    client: &User,
    booking_id: &str,
) -> ServiceResult<BookingResponse> {
    let mut tx = begin_write(db).await?;

    let booking = fetch_booking(&mut tx, booking_id).await?;
    if booking.user_id != client.id {
        return Err(ServiceError::Authorization(
            "You can only cancel your own bookings".to_string(),
        ));
    }

    let current = booking.state_enum();
    let next = current.cancel().map_err(ServiceError::InvalidState)?;
    transition(&mut tx, clock, booking_id, current, next).await?;

    let booking = fetch_booking(&mut tx, booking_id).await?;
    tx.commit().await?;

    record_booking(next);
    info!(booking_id = %booking_id, user_id = %client.id, "Cancelled booking");
    Ok(to_response(booking))
}

/// Accept or reject a pending request on one of the partner's listings
pub async fn update_booking_status(
    db: &SqlitePool,
    clock: &dyn Clock,
    partner: &User,
    booking_id: &str,
    action: BookingAction,
) -> ServiceResult<BookingResponse> {
    let mut tx = begin_write(db).await?;

    let booking = fetch_booking(&mut tx, booking_id).await?;
    if booking.owner_id != partner.id {
        return Err(ServiceError::Authorization(
            "This booking is not for one of your listings".to_string(),
        ));
    }

    let current = booking.state_enum();
    let next = current.decide(action).map_err(ServiceError::InvalidState)?;
    transition(&mut tx, clock, booking_id, current, next).await?;

    let booking = fetch_booking(&mut tx, booking_id).await?;
    tx.commit().await?;

    record_booking(next);
    info!(booking_id = %booking_id, user_id = %partner.id, state = %next, "Updated booking status");
    Ok(to_response(booking))
}

/// The client's bookings, newest first
pub async fn list_user_bookings(db: &SqlitePool, client: &User) -> ServiceResult<Vec<BookingResponse>> {
    let bookings = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(&client.id)
    .fetch_all(db)
    .await?;

    Ok(bookings.into_iter().map(to_response).collect())
}

/// Requests made on the partner's listings, newest first
pub async fn list_partner_bookings(
    db: &SqlitePool,
    partner: &User,
) -> ServiceResult<Vec<PartnerBookingResponse>> {
    let rows = sqlx::query_as::<_, PartnerBookingRow>(
        r#"
        SELECT b.*, u.name AS client_name, u.email AS client_email
        FROM bookings b
        JOIN users u ON u.id = b.user_id
        WHERE b.owner_id = ?
        ORDER BY b.created_at DESC, b.rowid DESC
        "#,
    )
    .bind(&partner.id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let client = ClientSummary {
                id: row.booking.user_id.clone(),
                name: row.client_name,
                email: row.client_email,
            };
            PartnerBookingResponse {
                booking: to_response(row.booking),
                client,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Role};
    use crate::services::testing;
    use chrono::Duration;

    async fn booking_count(pool: &SqlitePool, window_id: &str, user_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE window_id = ? AND user_id = ?")
            .bind(window_id)
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_booking_snapshots_window_and_listing() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", true).await;
        let window_id = testing::window_id(&pool, &listing.id).await;

        let booking = create_booking(&pool, &store, &clock, &client, &window_id, testing::next_monday())
            .await
            .unwrap();

        assert_eq!(booking.state, BookingState::Pending);
        assert_eq!(booking.feedback_client, "pending");
        assert_eq!(booking.feedback_article, "pending");
        assert_eq!(booking.day, "monday");
        assert_eq!(booking.date, "2026-10-26");
        assert_eq!(booking.time_slot.from, "09:00");
        assert_eq!(booking.time_slot.to, "17:00");
        assert_eq!(booking.car_details.title, "Clio");
        assert_eq!(booking.car_details.price, 350.0);
        assert_eq!(booking.listing_id.as_deref(), Some(listing.id.as_str()));
    }

    #[tokio::test]
    async fn test_duplicate_booking_is_a_conflict() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;
        let date = testing::next_monday();

        create_booking(&pool, &store, &clock, &client, &window_id, date).await.unwrap();
        assert!(matches!(
            create_booking(&pool, &store, &clock, &client, &window_id, date).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(booking_count(&pool, &window_id, &client.id).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_requests_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::init(dir.path()).await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;

        for week in 0..20 {
            let date = testing::next_monday() + Duration::days(7 * week);
            let (a, b) = tokio::join!(
                create_booking(&pool, &store, &clock, &client, &window_id, date),
                create_booking(&pool, &store, &clock, &client, &window_id, date),
            );

            let outcomes = [a, b];
            let created = outcomes.iter().filter(|r| r.is_ok()).count();
            let conflicts = outcomes
                .iter()
                .filter(|r| matches!(r, Err(ServiceError::Conflict(_))))
                .count();
            assert_eq!((created, conflicts), (1, 1), "week {}: {:?}", week, outcomes);
        }

        assert_eq!(booking_count(&pool, &window_id, &client.id).await, 20);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_the_slot() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;
        let date = testing::next_monday();

        let first = create_booking(&pool, &store, &clock, &client, &window_id, date).await.unwrap();
        cancel_booking(&pool, &clock, &client, &first.id).await.unwrap();

        create_booking(&pool, &store, &clock, &client, &window_id, date).await.unwrap();
        assert_eq!(booking_count(&pool, &window_id, &client.id).await, 2);
    }

    #[tokio::test]
    async fn test_different_clients_share_a_slot() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let alice = testing::user(&pool, "alice@example.com", Role::Client).await;
        let bob = testing::user(&pool, "bob@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;
        let date = testing::next_monday();

        create_booking(&pool, &store, &clock, &alice, &window_id, date).await.unwrap();
        create_booking(&pool, &store, &clock, &bob, &window_id, date).await.unwrap();
    }

    #[tokio::test]
    async fn test_inactive_window_is_unavailable_for_any_date() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;

        crate::services::availability::set_window_status(&pool, &clock, &partner, &window_id, false)
            .await
            .unwrap();

        let monday = testing::next_monday();
        for date in [monday, monday + Duration::days(1), monday - Duration::days(14)] {
            assert!(matches!(
                create_booking(&pool, &store, &clock, &client, &window_id, date).await,
                Err(ServiceError::Unavailable(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_booking_date_rules() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;
        let monday = testing::next_monday();

        let past = create_booking(&pool, &store, &clock, &client, &window_id, monday - Duration::days(14)).await;
        let wrong_day = create_booking(&pool, &store, &clock, &client, &window_id, monday + Duration::days(2)).await;
        for result in [past, wrong_day] {
            match result {
                Err(ServiceError::Validation(errors)) => assert!(errors.contains_key("date")),
                other => panic!("expected validation error, got {:?}", other),
            }
        }

        // Today is a Monday and may be booked
        create_booking(&pool, &store, &clock, &client, &window_id, clock.today())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_window_is_not_found() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let client = testing::user(&pool, "c@example.com", Role::Client).await;

        assert!(matches!(
            create_booking(&pool, &store, &clock, &client, "missing", testing::next_monday()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_only_once_and_only_by_owner() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let intruder = testing::user(&pool, "i@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;

        let booking = create_booking(&pool, &store, &clock, &client, &window_id, testing::next_monday())
            .await
            .unwrap();

        assert!(matches!(
            cancel_booking(&pool, &clock, &intruder, &booking.id).await,
            Err(ServiceError::Authorization(_))
        ));
        let unchanged = list_user_bookings(&pool, &client).await.unwrap();
        assert_eq!(unchanged[0].state, BookingState::Pending);

        let cancelled = cancel_booking(&pool, &clock, &client, &booking.id).await.unwrap();
        assert_eq!(cancelled.state, BookingState::Cancelled);

        assert!(matches!(
            cancel_booking(&pool, &clock, &client, &booking.id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            cancel_booking(&pool, &clock, &client, "missing").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_partner_decides_pending_requests_only() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let rival = testing::user(&pool, "r@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;

        let booking = create_booking(&pool, &store, &clock, &client, &window_id, testing::next_monday())
            .await
            .unwrap();

        assert!(matches!(
            update_booking_status(&pool, &clock, &rival, &booking.id, BookingAction::Accept).await,
            Err(ServiceError::Authorization(_))
        ));

        let accepted = update_booking_status(&pool, &clock, &partner, &booking.id, BookingAction::Accept)
            .await
            .unwrap();
        assert_eq!(accepted.state, BookingState::Accepted);

        assert!(matches!(
            update_booking_status(&pool, &clock, &partner, &booking.id, BookingAction::Reject).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            cancel_booking(&pool, &clock, &client, &booking.id).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_booking_lists() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;
        let monday = testing::next_monday();

        let older = create_booking(&pool, &store, &clock, &client, &window_id, monday).await.unwrap();
        clock.advance(Duration::minutes(5));
        let newer = create_booking(&pool, &store, &clock, &client, &window_id, monday + Duration::days(7))
            .await
            .unwrap();

        let mine: Vec<String> = list_user_bookings(&pool, &client)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(mine, vec![newer.id.clone(), older.id.clone()]);

        let inbox = list_partner_bookings(&pool, &partner).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].booking.id, newer.id);
        assert_eq!(inbox[0].client.email, "c@example.com");

        assert!(list_partner_bookings(&pool, &client).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_replacement_keeps_booking_history() {
        let pool = db::init_in_memory().await.unwrap();
        let store = testing::store();
        let clock = testing::clock();
        let partner = testing::user(&pool, "p@example.com", Role::Partner).await;
        let client = testing::user(&pool, "c@example.com", Role::Client).await;
        let listing = testing::listing(&pool, &clock, &partner, "Clio", false).await;
        let window_id = testing::window_id(&pool, &listing.id).await;

        create_booking(&pool, &store, &clock, &client, &window_id, testing::next_monday())
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        crate::services::availability::replace_windows(&mut tx, &clock, &listing.id, &[])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let history = list_user_bookings(&pool, &client).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].window_id, None);
        assert_eq!(history[0].time_slot.from, "09:00");
    }
}
