//! Lapangan - Badminton court rental backend

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lapangan::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{
            SqlxBookingRepository, SqlxFieldRepository, SqlxPaymentRepository,
            SqlxSessionRepository, SqlxUserRepository,
        },
    },
    services::{BookingService, FieldService, LoginRateLimiter, PaymentService, UserService},
};

/// Default seed price for the first court
const DEFAULT_FIELD_PRICE: f64 = 35000.0;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lapangan=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lapangan...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let field_repo = SqlxFieldRepository::boxed(pool.clone());
    let booking_repo = SqlxBookingRepository::boxed(pool.clone());
    let payment_repo = SqlxPaymentRepository::boxed(pool.clone());

    // Initialize services
    let user_service = Arc::new(UserService::with_session_expiration(
        user_repo,
        session_repo,
        config.auth.session_expiration_days,
    ));
    let field_service = Arc::new(FieldService::new(field_repo));
    let booking_service = Arc::new(BookingService::new(booking_repo.clone()));
    let payment_service = Arc::new(PaymentService::new(
        booking_repo,
        payment_repo,
        config.upload.clone(),
    ));

    // Seed data
    user_service
        .ensure_admin(
            &config.seed.admin_name,
            &config.seed.admin_email,
            &config.seed.admin_password,
        )
        .await?;
    if config.seed.default_field {
        if let Some(field) = field_service.ensure_default_field(DEFAULT_FIELD_PRICE).await? {
            tracing::info!("Seeded default field {} ({})", field.id, field.name);
        }
    }

    tokio::fs::create_dir_all(&config.upload.path).await?;

    let rate_limiter = Arc::new(LoginRateLimiter::new());

    // Start rate limiter cleanup task (runs every 5 minutes)
    {
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    // Purge expired sessions hourly
    {
        let users = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Purged {} expired sessions", n),
                    Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
                }
            }
        });
    }

    let config = Arc::new(config);
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        user_service,
        field_service,
        booking_service,
        payment_service,
        rate_limiter,
    };

    // Build router
    let app = api::build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
