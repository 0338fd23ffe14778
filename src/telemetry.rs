//! Domain counters shared by the services and the `/metrics` endpoint.

use metrics::counter;

use crate::db::BookingState;

pub const LISTINGS_TOTAL: &str = "listings_total";
pub const BOOKINGS_TOTAL: &str = "bookings_total";

/// Record a newly created listing.
pub fn record_listing_created() {
    counter!(LISTINGS_TOTAL).increment(1);
}

/// Record a booking entering `state`.
pub fn record_booking(state: BookingState) {
    counter!(BOOKINGS_TOTAL, "state" => state.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_booking_counter_is_labelled_by_state() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_booking(BookingState::Pending);
            record_booking(BookingState::Pending);
            record_booking(BookingState::Cancelled);
            record_listing_created();
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"bookings_total{state="pending"} 2"#), "{}", rendered);
        assert!(rendered.contains(r#"bookings_total{state="cancelled"} 1"#), "{}", rendered);
        assert!(rendered.contains("listings_total 1"), "{}", rendered);
    }
}
