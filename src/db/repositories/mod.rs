//! Database repositories
//!
//! One repository per entity, each a trait plus an sqlx implementation that
//! serves both SQLite and MySQL.

pub mod booking;
pub mod field;
pub mod payment;
pub mod session;
pub mod user;

pub use booking::{BookingRepository, SessionInsert, SqlxBookingRepository, StatusUpdate};
pub use field::{FieldRepository, SqlxFieldRepository};
pub use payment::{PaymentRepository, SqlxPaymentRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
