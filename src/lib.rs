//! Lapangan - Badminton court rental backend
//!
//! Players register, book courts by the hour or as a four-week member
//! package, and upload payment proofs; admins manage courts, users and
//! booking status.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
