//! Booking API endpoints (signed-in users)
//!
//! - POST /api/bookings - Admit a booking or member package
//! - GET /api/bookings/my - Own bookings
//! - POST /api/bookings/{id}/payment-proof - Multipart upload, file field `proof`

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{created, data, DataResponse};
use crate::models::{BookingWithField, CreateBookingInput, Payment};
use crate::services::ProofUpload;

/// Multipart field carrying the payment proof
const PROOF_FIELD: &str = "proof";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_booking))
        .route("/my", get(my_bookings))
        .route("/{id}/payment-proof", post(upload_payment_proof))
}

/// Responds with the first booking created; for a package that is the one
/// carrying the full price.
async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBookingInput>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .booking_service
        .admit(
            user.0.id,
            body.field_id,
            body.start_time,
            body.end_time,
            body.is_member_booking,
        )
        .await?;
    Ok(created(booking))
}

async fn my_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DataResponse<Vec<BookingWithField>>>, ApiError> {
    Ok(data(state.booking_service.list_for_user(user.0.id).await?))
}

async fn upload_payment_proof(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<DataResponse<Payment>>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::validation_error(format!("Invalid multipart body: {}", e.body_text()))
    })? {
        if field.name() != Some(PROOF_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = field.bytes().await.map_err(|e| {
            ApiError::validation_error(format!("Failed to read file: {}", e.body_text()))
        })?;

        let payment = state
            .payment_service
            .upload_proof(
                user.0.id,
                id,
                ProofUpload {
                    content_type,
                    data: bytes.to_vec(),
                },
            )
            .await?;
        return Ok(data(payment));
    }

    Err(ApiError::validation_error(format!(
        "No file provided in field '{}'",
        PROOF_FIELD
    )))
}
