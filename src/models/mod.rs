//! Data models
//!
//! Database entities, request inputs and the joined views returned by the API.

mod booking;
mod field;
mod payment;
mod session;
mod user;

pub use booking::{
    Booking, BookingAdminView, BookingStatus, BookingWithField, CreateBookingInput, NewBooking,
    PricedSlot, ScheduleEntry, SessionSlot,
};
pub use field::{Field, FieldInput};
pub use payment::{Payment, PaymentStatus};
pub use session::Session;
pub use user::{RegisterInput, UpdateProfileInput, UpdateUserInput, User, UserRole};
