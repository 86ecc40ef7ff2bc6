//! Booking model
//!
//! A booking holds one field for one half-open interval `[start_time, end_time)`.
//! Bookings are created `pending` by admission and only ever move to `paid`
//! or `canceled` afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Paid,
    Canceled,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "canceled" => Ok(Self::Canceled),
            _ => Err(anyhow::anyhow!("Invalid booking status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub field_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One concrete interval derived from a booking request.
///
/// Named to stay clear of the login [`Session`](super::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SessionSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Same slot moved by `offset`, keeping its length
    pub fn shifted(&self, offset: Duration) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// A slot paired with the price stored on its booking row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedSlot {
    pub slot: SessionSlot,
    pub total_price: f64,
}

/// Row data for a single booking insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub user_id: i64,
    pub field_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_price: f64,
}

/// Request body for `POST /api/bookings`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingInput {
    pub field_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Expand into the four-week member package
    #[serde(default)]
    pub is_member_booking: bool,
}

/// A caller's own booking with the field it is for
#[derive(Debug, Clone, Serialize)]
pub struct BookingWithField {
    #[serde(flatten)]
    pub booking: Booking,
    pub field_name: String,
    pub field_image_url: Option<String>,
}

/// Admin listing row
#[derive(Debug, Clone, Serialize)]
pub struct BookingAdminView {
    #[serde(flatten)]
    pub booking: Booking,
    pub user_name: String,
    pub field_name: String,
    pub proof_url: Option<String>,
    pub payment_status: Option<super::PaymentStatus>,
}

/// Public schedule entry; deliberately carries no user data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
}
