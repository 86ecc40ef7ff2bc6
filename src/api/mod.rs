//! API layer - HTTP handlers and routing
//!
//! JSON endpoints under `/api`; uploaded payment proofs are served from
//! `/uploads`.

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod fields;
pub mod middleware;
pub mod responses;
pub mod users;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};
use responses::{data, DataResponse, HealthResponse};

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me).put(users::update_me))
        .nest("/bookings", bookings::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .nest("/fields", fields::public_router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let origin = &config.server.cors_origin;
    let allow_origin = if origin == "*" {
        AllowOrigin::mirror_request()
    } else {
        match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                tracing::warn!("Invalid CORS origin '{}': {}", origin, e);
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let body_limit = usize::try_from(config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .nest_service("/uploads", ServeDir::new(&config.upload.path))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<DataResponse<HealthResponse>>, ApiError> {
    if let Err(e) = state.pool.ping().await {
        tracing::error!("Health check failed: {}", e);
        return Err(ApiError::new("SERVICE_UNAVAILABLE", "Database unavailable"));
    }
    Ok(data(HealthResponse {
        status: "ok",
        database: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::repositories::{
        SqlxBookingRepository, SqlxFieldRepository, SqlxPaymentRepository, SqlxSessionRepository,
        SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::services::{BookingService, FieldService, LoginRateLimiter, PaymentService, UserService};
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderMap, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ADMIN_EMAIL: &str = "admin@lapangan.test";
    const ADMIN_PASSWORD: &str = "admin123";

    async fn test_app() -> (Router, TempDir) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload.path = dir.path().join("uploads");

        let user_service = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        ));
        let field_service = Arc::new(FieldService::new(SqlxFieldRepository::boxed(pool.clone())));
        let booking_repo = SqlxBookingRepository::boxed(pool.clone());
        let booking_service = Arc::new(BookingService::new(booking_repo.clone()));
        let payment_service = Arc::new(PaymentService::new(
            booking_repo,
            SqlxPaymentRepository::boxed(pool.clone()),
            config.upload.clone(),
        ));

        user_service
            .ensure_admin("Admin", ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();
        field_service.ensure_default_field(35000.0).await.unwrap();

        let state = AppState {
            pool,
            config: Arc::new(config),
            user_service,
            field_service,
            booking_service,
            payment_service,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
        };
        (build_router(state), dir)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    async fn login(app: &Router, email: &str, password: &str) -> String {
        let (status, _, body) = send(
            app,
            json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "email": email, "password": password }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn player_token(app: &Router, email: &str) -> String {
        let (status, _, _) = send(
            app,
            json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "name": "Pemain", "email": email, "password": "rahasia" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        login(app, email, "rahasia").await
    }

    fn booking_body(start: &str, end: &str, member: bool) -> Value {
        json!({
            "field_id": 1,
            "start_time": start,
            "end_time": end,
            "is_member_booking": member,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app().await;
        let (status, _, body) = send(&app, get_request("/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_login_and_profile() {
        let (app, _dir) = test_app().await;

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "name": "Rina", "email": "rina@example.com", "phone": "0812", "password": "rahasia" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["role"], "user");
        assert!(body["data"].get("password_hash").is_none());

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "name": "Rina", "email": "rina@example.com", "password": "rahasia" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, headers, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "email": "rina@example.com", "password": "rahasia" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session=") && cookie.contains("HttpOnly"));
        let token = body["data"]["token"].as_str().unwrap();

        // Cookie-based auth
        let request = Request::builder()
            .uri("/api/users/me")
            .header(header::COOKIE, format!("session={}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "rina@example.com");

        let (status, _, body) = send(
            &app,
            json_request("PUT", "/api/users/me", Some(token), json!({ "phone": "0899" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["phone"], "0899");

        let (status, _, _) = send(
            &app,
            json_request("POST", "/api/auth/logout", Some(token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = send(&app, get_request("/api/users/me", Some(token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_rate_limited_after_repeated_failures() {
        let (app, _dir) = test_app().await;
        let wrong = json!({ "email": ADMIN_EMAIL, "password": "salah123" });

        for _ in 0..5 {
            let (status, _, _) =
                send(&app, json_request("POST", "/api/auth/login", None, wrong.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let right = json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD });
        let (status, _, body) =
            send(&app, json_request("POST", "/api/auth/login", None, right)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["details"]["retry_after"], 900);
    }

    #[tokio::test]
    async fn test_booking_admission_over_http() {
        let (app, _dir) = test_app().await;
        let token = player_token(&app, "andi@example.com").await;

        let (status, _, _) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                None,
                booking_body("2024-03-01T07:00:00Z", "2024-03-01T09:00:00Z", false),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                Some(&token),
                booking_body("2024-03-01T07:00:00Z", "2024-03-01T09:00:00Z", false),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["total_price"], 70000.0);
        assert_eq!(body["data"]["status"], "pending");

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                Some(&token),
                booking_body("2024-03-01T08:00:00Z", "2024-03-01T10:00:00Z", false),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["details"]["start_time"], "2024-03-01T08:00:00+00:00");

        let (status, _, _) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                Some(&token),
                booking_body("2024-03-01T09:00:00Z", "2024-03-01T09:00:00Z", false),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut unknown = booking_body("2024-03-02T07:00:00Z", "2024-03-02T08:00:00Z", false);
        unknown["field_id"] = json!(77);
        let (status, _, _) = send(
            &app,
            json_request("POST", "/api/bookings", Some(&token), unknown),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_member_package_over_http() {
        let (app, _dir) = test_app().await;
        let token = player_token(&app, "budi@example.com").await;

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                Some(&token),
                booking_body("2024-03-01T07:00:00Z", "2024-03-01T09:00:00Z", true),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["total_price"], 280000.0);

        let (status, _, body) = send(&app, get_request("/api/bookings/my", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let bookings = body["data"].as_array().unwrap();
        assert_eq!(bookings.len(), 4);
        assert!(bookings.iter().all(|b| b["field_name"] == "Lapangan Badminton"));
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin() {
        let (app, _dir) = test_app().await;
        let player = player_token(&app, "citra@example.com").await;

        let (status, _, _) = send(&app, get_request("/api/admin/bookings", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) = send(&app, get_request("/api/admin/bookings", Some(&player))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
        let (status, _, body) = send(&app, get_request("/api/admin/users", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_admin_status_update_and_public_schedule() {
        let (app, _dir) = test_app().await;
        let player = player_token(&app, "dodi@example.com").await;
        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let (_, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                Some(&player),
                booking_body("2030-06-01T07:00:00Z", "2030-06-01T08:00:00Z", false),
            ),
        )
        .await;
        let booking_id = body["data"]["id"].as_i64().unwrap();

        let (status, _, body) = send(
            &app,
            get_request(
                "/api/fields/1/bookings?from=2030-05-30T00:00:00Z&until=2030-06-30T00:00:00Z",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let uri = format!("/api/admin/bookings/{}/status", booking_id);
        let (status, _, _) = send(
            &app,
            json_request("PUT", &uri, Some(&admin), json!({ "status": "refunded" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = send(
            &app,
            json_request("PUT", &uri, Some(&admin), json!({ "status": "canceled" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "canceled");

        let (_, _, body) = send(
            &app,
            get_request(
                "/api/fields/1/bookings?from=2030-05-30T00:00:00Z&until=2030-06-30T00:00:00Z",
                None,
            ),
        )
        .await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let (status, _, _) = send(
            &app,
            json_request("PUT", "/api/admin/bookings/999/status", Some(&admin), json!({ "status": "paid" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_field_management() {
        let (app, _dir) = test_app().await;
        let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

        let (status, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/admin/fields",
                Some(&admin),
                json!({ "name": "Court 2", "price_per_hour": 40000 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, _, _) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/admin/fields/{}", id),
                Some(&admin),
                json!({ "name": "Court 2", "price_per_hour": 0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = send(&app, get_request("/api/fields", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/admin/fields/{}", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", admin))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = send(&app, get_request(&format!("/api/fields/{}", id), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_payment_proof_upload_and_serving() {
        let (app, _dir) = test_app().await;
        let token = player_token(&app, "eka@example.com").await;
        let other = player_token(&app, "fani@example.com").await;

        let (_, _, body) = send(
            &app,
            json_request(
                "POST",
                "/api/bookings",
                Some(&token),
                booking_body("2024-04-01T07:00:00Z", "2024-04-01T09:00:00Z", false),
            ),
        )
        .await;
        let booking_id = body["data"]["id"].as_i64().unwrap();

        let boundary = "lapanganboundary";
        let file = b"\x89PNG\r\n\x1a\nfake";
        let mut payload = Vec::new();
        payload.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"proof\"; filename=\"bukti.png\"\r\nContent-Type: image/png\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        payload.extend_from_slice(file);
        payload.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let upload = |token: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/api/bookings/{}/payment-proof", booking_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(payload.clone()))
                .unwrap()
        };

        let (status, _, _) = send(&app, upload(&other)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(&app, upload(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["amount"], 70000.0);
        let proof_url = body["data"]["proof_url"].as_str().unwrap().to_string();

        let response = app.clone().oneshot(get_request(&proof_url, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&served[..], &file[..]);
    }
}
