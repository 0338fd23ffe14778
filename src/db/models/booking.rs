//! Booking (rental request) models and the booking state machine.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of a booking. `Pending` is initial, everything else is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingState {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl BookingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Client-side cancellation
    pub fn cancel(self) -> Result<Self, String> {
        match self {
            Self::Pending => Ok(Self::Cancelled),
            Self::Cancelled => Err("Booking is already cancelled".to_string()),
            other => Err(format!("A {} booking can no longer be cancelled", other)),
        }
    }

    /// Partner decision on a pending request
    pub fn decide(self, action: BookingAction) -> Result<Self, String> {
        match self {
            Self::Pending => Ok(action.target_state()),
            other => Err(format!("Booking is already {}", other)),
        }
    }
}

impl std::fmt::Display for BookingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown booking state: {}", s)),
        }
    }
}

impl From<String> for BookingState {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Self::Pending)
    }
}

/// Partner response to a rental request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingAction {
    Accept,
    Reject,
}

impl BookingAction {
    pub fn target_state(&self) -> BookingState {
        match self {
            Self::Accept => BookingState::Accepted,
            Self::Reject => BookingState::Rejected,
        }
    }
}

impl std::str::FromStr for BookingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" | "accepted" => Ok(Self::Accept),
            "reject" | "rejected" => Ok(Self::Reject),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub window_id: Option<String>,
    pub listing_id: Option<String>,
    pub user_id: String,
    pub owner_id: String,
    pub date: String,
    pub day_name: String,
    pub time_from: String,
    pub time_to: String,
    pub listing_title: String,
    pub car_model: String,
    pub city: String,
    pub price: f64,
    pub image: Option<String>,
    pub state: String,
    pub feedback_client: String,
    pub feedback_article: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Booking {
    pub fn state_enum(&self) -> BookingState {
        BookingState::from(self.state.clone())
    }
}

/// Booking joined with the requesting client, for the partner inbox
#[derive(Debug, Clone, FromRow)]
pub struct PartnerBookingRow {
    #[sqlx(flatten)]
    pub booking: Booking,
    pub client_name: String,
    pub client_email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateBookingRequest {
    pub window_id: String,
    pub date: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateBookingStatusRequest {
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarDetails {
    pub title: String,
    pub car_model: String,
    pub city: String,
    pub price: f64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: String,
    pub window_id: Option<String>,
    pub listing_id: Option<String>,
    pub date: String,
    pub day: String,
    pub state: BookingState,
    pub feedback_client: String,
    pub feedback_article: String,
    pub car_details: CarDetails,
    pub time_slot: TimeSlot,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerBookingResponse {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub client: ClientSummary,
}
