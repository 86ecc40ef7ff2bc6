//! Admin API endpoints
//!
//! - GET /api/admin/bookings
//! - PUT /api/admin/bookings/{id}/status - `{"status": "pending" | "paid" | "canceled"}`
//! - GET /api/admin/users
//! - PUT /api/admin/users/{id}
//! - PUT /api/admin/users/{id}/password
//!
//! Field management lives in `fields::admin_router`, nested under `/admin/fields`.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::fields;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{data, DataResponse, MessageResponse};
use crate::models::{Booking, BookingAdminView, UpdateUserInput, User};

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

/// Routes below `/admin`; the caller applies the auth layers.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/fields", fields::admin_router())
        .route("/bookings", get(list_bookings))
        .route("/bookings/{id}/status", put(update_booking_status))
        .route("/users", get(list_users))
        .route("/users/{id}", put(update_user))
        .route("/users/{id}/password", put(set_password))
}

async fn list_bookings(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<BookingAdminView>>>, ApiError> {
    Ok(data(state.booking_service.list_all().await?))
}

async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<DataResponse<Booking>>, ApiError> {
    let booking = state.booking_service.update_status(id, &body.status).await?;
    Ok(data(booking))
}

async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<User>>>, ApiError> {
    Ok(data(state.user_service.list_users().await?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserInput>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    Ok(data(state.user_service.admin_update_user(id, body).await?))
}

async fn set_password(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetPasswordRequest>,
) -> Result<Json<DataResponse<MessageResponse>>, ApiError> {
    state.user_service.set_password(id, &body.password).await?;
    Ok(data(MessageResponse::new("Password updated")))
}
