//! Domain operations. Handlers in `api` authenticate and validate input, then
//! call into these modules with strongly typed arguments.

pub mod availability;
pub mod bookings;
pub mod cart;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod identity;
pub mod listings;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FieldErrors, ServiceError, ServiceResult};
