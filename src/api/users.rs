//! Profile endpoints for the signed-in user

use axum::{extract::State, Json};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{data, DataResponse};
use crate::models::{UpdateProfileInput, User};

/// GET /api/users/me
pub async fn me(user: AuthenticatedUser) -> Json<DataResponse<User>> {
    data(user.0)
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    let updated = state.user_service.update_profile(user.0.id, body).await?;
    Ok(data(updated))
}
