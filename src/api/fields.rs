//! Field API endpoints
//!
//! Public:
//! - GET /api/fields
//! - GET /api/fields/{id}
//! - GET /api/fields/{id}/bookings - occupied slots, `?from=&until=` (RFC 3339)
//!
//! Admin:
//! - POST /api/admin/fields
//! - PUT /api/admin/fields/{id}
//! - DELETE /api/admin/fields/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{created, data, DataResponse};
use crate::models::{Field, FieldInput, ScheduleEntry};

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_fields))
        .route("/{id}", get(get_field))
        .route("/{id}/bookings", get(field_schedule))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_field))
        .route("/{id}", put(update_field).delete(delete_field))
}

async fn list_fields(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<Field>>>, ApiError> {
    Ok(data(state.field_service.list().await?))
}

async fn get_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DataResponse<Field>>, ApiError> {
    Ok(data(state.field_service.get(id).await?))
}

async fn field_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<DataResponse<Vec<ScheduleEntry>>>, ApiError> {
    let schedule = state
        .booking_service
        .field_schedule(id, query.from, query.until)
        .await?;
    Ok(data(schedule))
}

async fn create_field(
    State(state): State<AppState>,
    Json(body): Json<FieldInput>,
) -> Result<impl IntoResponse, ApiError> {
    let field = state.field_service.create(body).await?;
    Ok(created(field))
}

async fn update_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<FieldInput>,
) -> Result<Json<DataResponse<Field>>, ApiError> {
    Ok(data(state.field_service.update(id, body).await?))
}

async fn delete_field(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.field_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
