//! Services layer - Business logic
//!
//! Services validate input, apply the rental rules and coordinate the
//! repositories. HTTP concerns stay in `api`.

pub mod booking;
pub mod field;
pub mod password;
pub mod payment;
pub mod rate_limiter;
pub mod user;

pub use booking::{AdmissionError, BookingService, BookingServiceError};
pub use field::{FieldService, FieldServiceError};
pub use password::{hash_password, verify_password};
pub use payment::{PaymentService, PaymentServiceError, ProofUpload};
pub use rate_limiter::LoginRateLimiter;
pub use user::{UserService, UserServiceError};
