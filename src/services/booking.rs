//! Booking service
//!
//! Admission turns a booking request into stored bookings or rejects it:
//!
//! 1. Times are cut to whole seconds, the precision every backing store
//!    keeps, and `end <= start` is rejected before any storage access.
//! 2. The field's hourly price is resolved; an unknown field stops here.
//! 3. The request expands into one slot, or four weekly slots for a member
//!    package.
//! 4. Each slot is checked against live (non-canceled) bookings in order; the
//!    first conflicting slot is reported.
//! 5. All slots are inserted in one transaction that re-checks overlap, so a
//!    package is committed whole or not at all.
//!
//! Steps 4 and 5 run under a per-field lock so two requests for the same
//! field in this process never interleave.
//!
//! Package pricing is front-loaded: the first booking carries the price of all
//! four sessions and the remaining three are stored at zero.

use crate::db::repositories::{BookingRepository, SessionInsert, StatusUpdate};
use crate::models::{
    Booking, BookingAdminView, BookingStatus, BookingWithField, PaymentStatus, PricedSlot,
    ScheduleEntry, SessionSlot,
};
use anyhow::Context;
use chrono::{DateTime, Duration, Months, SubsecRound, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sessions in a member package
pub const PACKAGE_SESSIONS: usize = 4;

/// Days between consecutive package sessions
pub const PACKAGE_INTERVAL_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Field not found: {0}")]
    FieldNotFound(i64),

    #[error("End time must be after start time")]
    InvalidRange,

    /// A requested slot overlaps a pending or paid booking
    #[error("Slot starting at {start} is already booked")]
    SlotConflict { start: DateTime<Utc> },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BookingServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Reviving a canceled booking would overlap a live one
    #[error("Slot starting at {start} is already booked")]
    SlotConflict { start: DateTime<Utc> },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Half-open interval intersection: touching ends do not overlap.
pub fn overlaps(
    existing_start: DateTime<Utc>,
    existing_end: DateTime<Utc>,
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
) -> bool {
    existing_start < candidate_end && existing_end > candidate_start
}

/// Slots covered by a request: the interval itself, or for a package the
/// interval repeated weekly for [`PACKAGE_SESSIONS`] weeks.
pub fn expand_sessions(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_package: bool,
) -> Vec<SessionSlot> {
    let first = SessionSlot::new(start, end);
    if !is_package {
        return vec![first];
    }
    (0..PACKAGE_SESSIONS as i64)
        .map(|week| first.shifted(Duration::days(PACKAGE_INTERVAL_DAYS * week)))
        .collect()
}

/// Price of one session: fractional hours times the hourly rate
pub fn session_price(slot: &SessionSlot, price_per_hour: f64) -> f64 {
    let hours = slot.duration().num_milliseconds() as f64 / 3_600_000.0;
    hours * price_per_hour
}

fn price_slots(slots: &[SessionSlot], session_price: f64, is_package: bool) -> Vec<PricedSlot> {
    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let total_price = match (is_package, i) {
                (false, _) => session_price,
                (true, 0) => session_price * slots.len() as f64,
                (true, _) => 0.0,
            };
            PricedSlot {
                slot: *slot,
                total_price,
            }
        })
        .collect()
}

pub struct BookingService {
    booking_repo: Arc<dyn BookingRepository>,
    field_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl BookingService {
    pub fn new(booking_repo: Arc<dyn BookingRepository>) -> Self {
        Self {
            booking_repo,
            field_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn field_lock(&self, field_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.field_locks.lock().await;
        locks.entry(field_id).or_default().clone()
    }

    /// Admit a booking request, returning the first created booking.
    pub async fn admit(
        &self,
        user_id: i64,
        field_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        is_package: bool,
    ) -> Result<Booking, AdmissionError> {
        let start = start.trunc_subsecs(0);
        let end = end.trunc_subsecs(0);
        if end <= start {
            return Err(AdmissionError::InvalidRange);
        }

        let price_per_hour = self
            .booking_repo
            .get_field_price(field_id)
            .await
            .context("Failed to resolve field price")?
            .ok_or(AdmissionError::FieldNotFound(field_id))?;

        let slots = expand_sessions(start, end, is_package);
        let per_session = session_price(&slots[0], price_per_hour);

        let lock = self.field_lock(field_id).await;
        let _guard = lock.lock().await;

        for slot in &slots {
            let clashes = self
                .booking_repo
                .find_overlapping(field_id, slot.start, slot.end)
                .await
                .context("Failed to check overlapping bookings")?;
            if !clashes.is_empty() {
                tracing::debug!(
                    "Field {} slot {} clashes with {} booking(s)",
                    field_id,
                    slot.start,
                    clashes.len()
                );
                return Err(AdmissionError::SlotConflict { start: slot.start });
            }
        }

        let priced = price_slots(&slots, per_session, is_package);
        let bookings = match self
            .booking_repo
            .insert_sessions_atomic(user_id, field_id, &priced)
            .await
            .context("Failed to store bookings")?
        {
            SessionInsert::Committed(bookings) => bookings,
            SessionInsert::Conflict { start } => {
                return Err(AdmissionError::SlotConflict { start });
            }
        };

        tracing::info!(
            "User {} booked field {} ({} session(s), {} total)",
            user_id,
            field_id,
            bookings.len(),
            priced.iter().map(|p| p.total_price).sum::<f64>()
        );

        bookings
            .into_iter()
            .next()
            .ok_or_else(|| AdmissionError::Storage(anyhow::anyhow!("No booking was stored")))
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<BookingWithField>, BookingServiceError> {
        let bookings = self
            .booking_repo
            .list_by_user(user_id)
            .await
            .context("Failed to list user bookings")?;
        Ok(bookings)
    }

    /// Public schedule of a field. The window defaults to now .. now + 1 month.
    pub async fn field_schedule(
        &self,
        field_id: i64,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScheduleEntry>, BookingServiceError> {
        if self
            .booking_repo
            .get_field_price(field_id)
            .await
            .context("Failed to load field")?
            .is_none()
        {
            return Err(BookingServiceError::NotFound(format!(
                "Field {} not found",
                field_id
            )));
        }

        let from = from.unwrap_or_else(Utc::now);
        let until = until.unwrap_or_else(|| one_month_after(from));
        if until < from {
            return Err(BookingServiceError::ValidationError(
                "Schedule window ends before it starts".to_string(),
            ));
        }

        let entries = self
            .booking_repo
            .schedule(field_id, from, until)
            .await
            .context("Failed to load field schedule")?;
        Ok(entries)
    }

    pub async fn list_all(&self) -> Result<Vec<BookingAdminView>, BookingServiceError> {
        let bookings = self
            .booking_repo
            .list_all()
            .await
            .context("Failed to list bookings")?;
        Ok(bookings)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Booking>, BookingServiceError> {
        let booking = self
            .booking_repo
            .get_by_id(id)
            .await
            .context("Failed to get booking")?;
        Ok(booking)
    }

    /// Admin status change. Paying verifies the payment; canceling rejects it.
    /// A canceled booking can be revived only while its slot is still free.
    pub async fn update_status(
        &self,
        booking_id: i64,
        status: &str,
    ) -> Result<Booking, BookingServiceError> {
        let status = BookingStatus::from_str(status).map_err(|_| {
            BookingServiceError::ValidationError(format!(
                "Invalid status '{}', expected pending, paid or canceled",
                status
            ))
        })?;

        let payment_status = match status {
            BookingStatus::Paid => Some(PaymentStatus::Verified),
            BookingStatus::Canceled => Some(PaymentStatus::Rejected),
            BookingStatus::Pending => None,
        };

        let not_found = || BookingServiceError::NotFound(format!("Booking {} not found", booking_id));
        let current = self
            .booking_repo
            .get_by_id(booking_id)
            .await
            .context("Failed to get booking")?
            .ok_or_else(not_found)?;

        // Reviving a booking competes with admissions for the same field.
        let lock = self.field_lock(current.field_id).await;
        let _guard = lock.lock().await;

        let booking = match self
            .booking_repo
            .update_status(booking_id, status, payment_status)
            .await
            .context("Failed to update booking status")?
        {
            StatusUpdate::Updated(booking) => booking,
            StatusUpdate::NotFound => return Err(not_found()),
            StatusUpdate::Conflict { start } => {
                tracing::debug!(
                    "Booking {} cannot become {}: slot at {} is taken",
                    booking_id,
                    status,
                    start
                );
                return Err(BookingServiceError::SlotConflict { start });
            }
        };

        tracing::info!("Booking {} set to {}", booking_id, status);
        Ok(booking)
    }
}

fn one_month_after(from: DateTime<Utc>) -> DateTime<Utc> {
    from.checked_add_months(Months::new(1))
        .unwrap_or(from + Duration::days(30))
}
