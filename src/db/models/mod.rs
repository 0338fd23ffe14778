//! Database models split into domain-specific modules.

pub mod availability;
pub mod booking;
pub mod cart;
pub mod common;
pub mod listing;
pub mod user;

pub use availability::*;
pub use booking::*;
pub use cart::*;
pub use common::*;
pub use listing::*;
pub use user::*;
