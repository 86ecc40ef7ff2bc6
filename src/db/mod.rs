//! Database layer
//!
//! SQLite is the default backend (a single file next to the binary); MySQL is
//! available for shared deployments. The driver is picked from configuration
//! and hidden behind [`DatabasePool`], and every repository dispatches on
//! [`DatabasePool::driver`].
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let bookings = SqlxBookingRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
