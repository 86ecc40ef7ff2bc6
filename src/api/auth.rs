//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create a player account
//! - POST /api/auth/login - Email/password login, sets the `session` cookie
//! - POST /api/auth/logout - End the current session

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser, ClientIp};
use crate::api::responses::{created, data, LoginResponse};
use crate::models::RegisterInput;
use crate::services::UserServiceError;

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.register(body).await?;
    Ok(created(user))
}

/// POST /api/auth/login
///
/// Throttled per client IP (10/min) and per email (5 failures / 15 min).
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limiter = &state.rate_limiter;

    if let Some(ip) = ip {
        if limiter.is_ip_limited(ip).await {
            tracing::warn!("Login rate limit hit for {}", ip);
            return Err(ApiError::rate_limited(
                "Too many login requests, try again later",
                60,
            ));
        }
        limiter.record_ip_request(ip).await;
    }

    if limiter.is_email_limited(&body.email).await {
        return Err(ApiError::rate_limited(
            "Too many failed attempts, try again in 15 minutes",
            900,
        ));
    }

    let (session, user) = match state.user_service.login(&body.email, &body.password).await {
        Ok(result) => result,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                limiter.record_failed_attempt(&body.email).await;
            }
            return Err(e.into());
        }
    };
    limiter.clear_email_attempts(&body.email).await;

    let max_age = state.config.auth.session_expiration_days * 24 * 60 * 60;
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id, max_age
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(ApiError::internal_error)?,
    );

    tracing::info!("User {} logged in", user.id);
    Ok((
        headers,
        data(LoginResponse {
            token: session.id,
            user,
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, response_headers))
}
