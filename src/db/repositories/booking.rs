//! Booking repository
//!
//! The reservation store behind admission. Besides plain reads and inserts it
//! offers [`BookingRepository::insert_sessions_atomic`], which re-checks
//! overlap and inserts every slot of a request inside one transaction so a
//! request is committed whole or not at all.
//!
//! Overlap is half-open: an existing booking `[s, e)` conflicts with a
//! candidate `[cs, ce)` when `s < ce AND e > cs`. Canceled bookings never
//! conflict, and a canceled booking can only come back to life if its slot is
//! still free.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{
    Booking, BookingAdminView, BookingStatus, BookingWithField, NewBooking, PaymentStatus,
    PricedSlot, ScheduleEntry,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;

/// Result of an atomic multi-slot insert
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInsert {
    /// Every slot was inserted, in request order
    Committed(Vec<Booking>),
    /// The slot starting at `start` overlaps a live booking; nothing was written
    Conflict { start: DateTime<Utc> },
}

/// Result of a status change
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Updated(Booking),
    NotFound,
    /// Reviving a canceled booking would overlap the live booking starting at
    /// `start`; nothing was written
    Conflict { start: DateTime<Utc> },
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Hourly price of a field, `None` when the field does not exist
    async fn get_field_price(&self, field_id: i64) -> Result<Option<f64>>;

    /// Non-canceled bookings on `field_id` overlapping `[start, end)`
    async fn find_overlapping(
        &self,
        field_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>>;

    /// Insert one `pending` booking per slot inside a single transaction,
    /// re-checking overlap before each insert.
    async fn insert_sessions_atomic(
        &self,
        user_id: i64,
        field_id: i64,
        slots: &[PricedSlot],
    ) -> Result<SessionInsert>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Booking>>;

    /// A user's bookings, newest first, with field name and image
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<BookingWithField>>;

    /// Non-canceled bookings on a field starting within `[from, until]`
    async fn schedule(
        &self,
        field_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>>;

    /// Every booking, newest first, with user, field and payment details
    async fn list_all(&self) -> Result<Vec<BookingAdminView>>;

    /// Set a booking's status and, when given, its payment's status in the
    /// same transaction. Moving a canceled booking back to `pending` or `paid`
    /// re-checks overlap against the other live bookings on its field.
    async fn update_status(
        &self,
        id: i64,
        status: BookingStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<StatusUpdate>;
}

pub struct SqlxBookingRepository {
    pool: DynDatabasePool,
}

impl SqlxBookingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BookingRepository> {
        Arc::new(Self::new(pool))
    }

    /// Insert a single `pending` booking without any overlap check.
    /// Fixture helper only: admission goes through `insert_sessions_atomic`.
    #[cfg(test)]
    pub(crate) async fn insert(&self, booking: &NewBooking) -> Result<Booking> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_new_booking(sqlx::query(INSERT_BOOKING), booking, now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to insert booking")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => {
                bind_new_booking_mysql(sqlx::query(INSERT_BOOKING), booking, now)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to insert booking")?
                    .last_insert_id() as i64
            }
        };
        Ok(pending_booking(id, booking, now))
    }
}

const BOOKING_COLUMNS: &str = "b.id, b.user_id, b.field_id, b.start_time, b.end_time, \
     b.status, b.total_price, b.created_at, b.updated_at";

const OVERLAP_FILTER: &str =
    "b.field_id = ? AND b.status <> 'canceled' AND b.start_time < ? AND b.end_time > ?";

const OTHERS_OVERLAP_FILTER: &str = "b.field_id = ? AND b.status <> 'canceled' \
     AND b.start_time < ? AND b.end_time > ? AND b.id <> ?";

const INSERT_BOOKING: &str = r#"
    INSERT INTO bookings (user_id, field_id, start_time, end_time, status, total_price, created_at, updated_at)
    VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
"#;

#[async_trait]
impl BookingRepository for SqlxBookingRepository {
    async fn get_field_price(&self, field_id: i64) -> Result<Option<f64>> {
        let sql = "SELECT price_per_hour FROM fields WHERE id = ?";
        let price = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(field_id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get field price")?
                .map(|row| row.get("price_per_hour")),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(field_id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get field price")?
                .map(|row| row.get("price_per_hour")),
        };
        Ok(price)
    }

    async fn find_overlapping(
        &self,
        field_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_overlapping_sqlite(sqlite(&self.pool)?, field_id, start, end).await
            }
            DatabaseDriver::Mysql => {
                find_overlapping_mysql(mysql(&self.pool)?, field_id, start, end).await
            }
        }
    }

    async fn insert_sessions_atomic(
        &self,
        user_id: i64,
        field_id: i64,
        slots: &[PricedSlot],
    ) -> Result<SessionInsert> {
        let rows: Vec<NewBooking> = slots
            .iter()
            .map(|priced| NewBooking {
                user_id,
                field_id,
                start_time: priced.slot.start,
                end_time: priced.slot.end,
                total_price: priced.total_price,
            })
            .collect();

        match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_sessions_sqlite(sqlite(&self.pool)?, &rows).await,
            DatabaseDriver::Mysql => insert_sessions_mysql(mysql(&self.pool)?, &rows).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings b WHERE b.id = ?", BOOKING_COLUMNS);
        let booking = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get booking by ID")?;
                row.as_ref().map(row_to_booking_sqlite).transpose()?
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get booking by ID")?;
                row.as_ref().map(row_to_booking_mysql).transpose()?
            }
        };
        Ok(booking)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<BookingWithField>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_by_user_sqlite(sqlite(&self.pool)?, user_id).await,
            DatabaseDriver::Mysql => list_by_user_mysql(mysql(&self.pool)?, user_id).await,
        }
    }

    async fn schedule(
        &self,
        field_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                schedule_sqlite(sqlite(&self.pool)?, field_id, from, until).await
            }
            DatabaseDriver::Mysql => {
                schedule_mysql(mysql(&self.pool)?, field_id, from, until).await
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<BookingAdminView>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_all_sqlite(sqlite(&self.pool)?).await,
            DatabaseDriver::Mysql => list_all_mysql(mysql(&self.pool)?).await,
        }
    }

    async fn update_status(
        &self,
        id: i64,
        status: BookingStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<StatusUpdate> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_status_sqlite(sqlite(&self.pool)?, id, status, payment_status).await
            }
            DatabaseDriver::Mysql => {
                update_status_mysql(mysql(&self.pool)?, id, status, payment_status).await
            }
        }
    }
}

fn pending_booking(id: i64, booking: &NewBooking, now: DateTime<Utc>) -> Booking {
    Booking {
        id,
        user_id: booking.user_id,
        field_id: booking.field_id,
        start_time: booking.start_time,
        end_time: booking.end_time,
        status: BookingStatus::Pending,
        total_price: booking.total_price,
        created_at: now,
        updated_at: now,
    }
}

/// A canceled booking returning to `pending` or `paid` claims its slot again.
fn revives(current: BookingStatus, next: BookingStatus) -> bool {
    current == BookingStatus::Canceled && next != BookingStatus::Canceled
}

fn parse_status(raw: &str) -> Result<BookingStatus> {
    BookingStatus::from_str(raw).with_context(|| format!("Invalid booking status in database: {}", raw))
}

// ============================================================================
// SQLite implementations
// ============================================================================

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_new_booking<'q>(
    query: SqliteQuery<'q>,
    booking: &NewBooking,
    now: DateTime<Utc>,
) -> SqliteQuery<'q> {
    query
        .bind(booking.user_id)
        .bind(booking.field_id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.total_price)
        .bind(now)
        .bind(now)
}

async fn find_overlapping_sqlite(
    pool: &SqlitePool,
    field_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Booking>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM bookings b WHERE {} ORDER BY b.start_time",
        BOOKING_COLUMNS, OVERLAP_FILTER
    ))
    .bind(field_id)
    .bind(end)
    .bind(start)
    .fetch_all(pool)
    .await
    .context("Failed to query overlapping bookings")?;

    rows.iter().map(row_to_booking_sqlite).collect()
}

async fn count_overlapping_sqlite(
    tx: &mut Transaction<'_, Sqlite>,
    booking: &NewBooking,
) -> Result<i64> {
    let count = sqlx::query(&format!(
        "SELECT COUNT(*) AS count FROM bookings b WHERE {}",
        OVERLAP_FILTER
    ))
    .bind(booking.field_id)
    .bind(booking.end_time)
    .bind(booking.start_time)
    .fetch_one(&mut **tx)
    .await
    .context("Failed to re-check overlap")?
    .get("count");
    Ok(count)
}

async fn insert_sessions_sqlite(pool: &SqlitePool, rows: &[NewBooking]) -> Result<SessionInsert> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Take the write lock up front, the SQLite counterpart of FOR UPDATE.
    if let Some(first) = rows.first() {
        sqlx::query("UPDATE fields SET updated_at = updated_at WHERE id = ?")
            .bind(first.field_id)
            .execute(&mut *tx)
            .await
            .context("Failed to lock field")?;
    }

    let now = Utc::now();
    let mut inserted = Vec::with_capacity(rows.len());
    for row in rows {
        if count_overlapping_sqlite(&mut tx, row).await? > 0 {
            // Dropping the transaction rolls back earlier inserts.
            return Ok(SessionInsert::Conflict {
                start: row.start_time,
            });
        }
        let id = bind_new_booking(sqlx::query(INSERT_BOOKING), row, now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert booking")?
            .last_insert_rowid();
        inserted.push(pending_booking(id, row, now));
    }

    tx.commit().await.context("Failed to commit bookings")?;
    Ok(SessionInsert::Committed(inserted))
}

async fn list_by_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<BookingWithField>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}, f.name AS field_name, f.image_url AS field_image_url
        FROM bookings b
        JOIN fields f ON f.id = b.field_id
        WHERE b.user_id = ?
        ORDER BY b.created_at DESC, b.id DESC
        "#,
        BOOKING_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list user bookings")?;

    rows.iter()
        .map(|row| {
            Ok(BookingWithField {
                booking: row_to_booking_sqlite(row)?,
                field_name: row.get("field_name"),
                field_image_url: row.get("field_image_url"),
            })
        })
        .collect()
}

async fn schedule_sqlite(
    pool: &SqlitePool,
    field_id: i64,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<ScheduleEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT start_time, end_time, status
        FROM bookings
        WHERE field_id = ? AND status <> 'canceled' AND start_time >= ? AND start_time <= ?
        ORDER BY start_time
        "#,
    )
    .bind(field_id)
    .bind(from)
    .bind(until)
    .fetch_all(pool)
    .await
    .context("Failed to load field schedule")?;

    rows.iter()
        .map(|row| {
            Ok(ScheduleEntry {
                start_time: row.get("start_time"),
                end_time: row.get("end_time"),
                status: parse_status(row.get("status"))?,
            })
        })
        .collect()
}

async fn list_all_sqlite(pool: &SqlitePool) -> Result<Vec<BookingAdminView>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}, u.name AS user_name, f.name AS field_name,
               p.proof_url AS proof_url, p.status AS payment_status
        FROM bookings b
        JOIN users u ON u.id = b.user_id
        JOIN fields f ON f.id = b.field_id
        LEFT JOIN payments p ON p.booking_id = b.id
        ORDER BY b.created_at DESC, b.id DESC
        "#,
        BOOKING_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list bookings")?;

    rows.iter()
        .map(|row| {
            let payment_status: Option<String> = row.get("payment_status");
            Ok(BookingAdminView {
                booking: row_to_booking_sqlite(row)?,
                user_name: row.get("user_name"),
                field_name: row.get("field_name"),
                proof_url: row.get("proof_url"),
                payment_status: payment_status
                    .as_deref()
                    .map(PaymentStatus::from_str)
                    .transpose()?,
            })
        })
        .collect()
}

async fn first_live_clash_sqlite(
    tx: &mut Transaction<'_, Sqlite>,
    booking: &Booking,
) -> Result<Option<DateTime<Utc>>> {
    let row = sqlx::query(&format!(
        "SELECT b.start_time FROM bookings b WHERE {} ORDER BY b.start_time LIMIT 1",
        OTHERS_OVERLAP_FILTER
    ))
    .bind(booking.field_id)
    .bind(booking.end_time)
    .bind(booking.start_time)
    .bind(booking.id)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to re-check overlap")?;
    Ok(row.map(|row| row.get("start_time")))
}

async fn update_status_sqlite(
    pool: &SqlitePool,
    id: i64,
    status: BookingStatus,
    payment_status: Option<PaymentStatus>,
) -> Result<StatusUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Write lock first so the overlap re-check cannot race an admission.
    let touched = sqlx::query("UPDATE bookings SET updated_at = updated_at WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to lock booking")?
        .rows_affected();
    if touched == 0 {
        return Ok(StatusUpdate::NotFound);
    }

    let row = sqlx::query(&format!("SELECT {} FROM bookings b WHERE b.id = ?", BOOKING_COLUMNS))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to load booking")?;
    let mut booking = row_to_booking_sqlite(&row)?;

    if revives(booking.status, status) {
        if let Some(start) = first_live_clash_sqlite(&mut tx, &booking).await? {
            return Ok(StatusUpdate::Conflict { start });
        }
    }

    let now = Utc::now();
    sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update booking status")?;

    if let Some(payment_status) = payment_status {
        sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE booking_id = ?")
            .bind(payment_status.to_string())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update payment status")?;
    }

    tx.commit().await.context("Failed to commit status change")?;
    booking.status = status;
    booking.updated_at = now;
    Ok(StatusUpdate::Updated(booking))
}

fn row_to_booking_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Booking> {
    Ok(Booking {
        id: row.get("id"),
        user_id: row.get("user_id"),
        field_id: row.get("field_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status: parse_status(row.get("status"))?,
        total_price: row.get("total_price"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>;

fn bind_new_booking_mysql<'q>(
    query: MySqlQuery<'q>,
    booking: &NewBooking,
    now: DateTime<Utc>,
) -> MySqlQuery<'q> {
    query
        .bind(booking.user_id)
        .bind(booking.field_id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.total_price)
        .bind(now)
        .bind(now)
}

async fn find_overlapping_mysql(
    pool: &MySqlPool,
    field_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Booking>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM bookings b WHERE {} ORDER BY b.start_time",
        BOOKING_COLUMNS, OVERLAP_FILTER
    ))
    .bind(field_id)
    .bind(end)
    .bind(start)
    .fetch_all(pool)
    .await
    .context("Failed to query overlapping bookings")?;

    rows.iter().map(row_to_booking_mysql).collect()
}

async fn count_overlapping_mysql(
    tx: &mut Transaction<'_, MySql>,
    booking: &NewBooking,
) -> Result<i64> {
    let count = sqlx::query(&format!(
        "SELECT COUNT(*) AS count FROM bookings b WHERE {}",
        OVERLAP_FILTER
    ))
    .bind(booking.field_id)
    .bind(booking.end_time)
    .bind(booking.start_time)
    .fetch_one(&mut **tx)
    .await
    .context("Failed to re-check overlap")?
    .get("count");
    Ok(count)
}

async fn insert_sessions_mysql(pool: &MySqlPool, rows: &[NewBooking]) -> Result<SessionInsert> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Serializes admissions for the field across every app instance.
    if let Some(first) = rows.first() {
        sqlx::query("SELECT id FROM fields WHERE id = ? FOR UPDATE")
            .bind(first.field_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock field")?;
    }

    let now = Utc::now();
    let mut inserted = Vec::with_capacity(rows.len());
    for row in rows {
        if count_overlapping_mysql(&mut tx, row).await? > 0 {
            return Ok(SessionInsert::Conflict {
                start: row.start_time,
            });
        }
        let id = bind_new_booking_mysql(sqlx::query(INSERT_BOOKING), row, now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert booking")?
            .last_insert_id() as i64;
        inserted.push(pending_booking(id, row, now));
    }

    tx.commit().await.context("Failed to commit bookings")?;
    Ok(SessionInsert::Committed(inserted))
}

async fn list_by_user_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<BookingWithField>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}, f.name AS field_name, f.image_url AS field_image_url
        FROM bookings b
        JOIN fields f ON f.id = b.field_id
        WHERE b.user_id = ?
        ORDER BY b.created_at DESC, b.id DESC
        "#,
        BOOKING_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list user bookings")?;

    rows.iter()
        .map(|row| {
            Ok(BookingWithField {
                booking: row_to_booking_mysql(row)?,
                field_name: row.get("field_name"),
                field_image_url: row.get("field_image_url"),
            })
        })
        .collect()
}

async fn schedule_mysql(
    pool: &MySqlPool,
    field_id: i64,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<ScheduleEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT start_time, end_time, status
        FROM bookings
        WHERE field_id = ? AND status <> 'canceled' AND start_time >= ? AND start_time <= ?
        ORDER BY start_time
        "#,
    )
    .bind(field_id)
    .bind(from)
    .bind(until)
    .fetch_all(pool)
    .await
    .context("Failed to load field schedule")?;

    rows.iter()
        .map(|row| {
            Ok(ScheduleEntry {
                start_time: row.get("start_time"),
                end_time: row.get("end_time"),
                status: parse_status(row.get("status"))?,
            })
        })
        .collect()
}

async fn list_all_mysql(pool: &MySqlPool) -> Result<Vec<BookingAdminView>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}, u.name AS user_name, f.name AS field_name,
               p.proof_url AS proof_url, p.status AS payment_status
        FROM bookings b
        JOIN users u ON u.id = b.user_id
        JOIN fields f ON f.id = b.field_id
        LEFT JOIN payments p ON p.booking_id = b.id
        ORDER BY b.created_at DESC, b.id DESC
        "#,
        BOOKING_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list bookings")?;

    rows.iter()
        .map(|row| {
            let payment_status: Option<String> = row.get("payment_status");
            Ok(BookingAdminView {
                booking: row_to_booking_mysql(row)?,
                user_name: row.get("user_name"),
                field_name: row.get("field_name"),
                proof_url: row.get("proof_url"),
                payment_status: payment_status
                    .as_deref()
                    .map(PaymentStatus::from_str)
                    .transpose()?,
            })
        })
        .collect()
}

async fn first_live_clash_mysql(
    tx: &mut Transaction<'_, MySql>,
    booking: &Booking,
) -> Result<Option<DateTime<Utc>>> {
    let row = sqlx::query(&format!(
        "SELECT b.start_time FROM bookings b WHERE {} ORDER BY b.start_time LIMIT 1",
        OTHERS_OVERLAP_FILTER
    ))
    .bind(booking.field_id)
    .bind(booking.end_time)
    .bind(booking.start_time)
    .bind(booking.id)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to re-check overlap")?;
    Ok(row.map(|row| row.get("start_time")))
}

async fn update_status_mysql(
    pool: &MySqlPool,
    id: i64,
    status: BookingStatus,
    payment_status: Option<PaymentStatus>,
) -> Result<StatusUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let field_id: Option<i64> = sqlx::query_scalar("SELECT field_id FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to load booking")?;
    let Some(field_id) = field_id else {
        return Ok(StatusUpdate::NotFound);
    };

    // Same lock order as admission: field row, then booking row.
    sqlx::query("SELECT id FROM fields WHERE id = ? FOR UPDATE")
        .bind(field_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock field")?;
    let row = sqlx::query(&format!(
        "SELECT {} FROM bookings b WHERE b.id = ? FOR UPDATE",
        BOOKING_COLUMNS
    ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to load booking")?;
    let Some(row) = row else {
        return Ok(StatusUpdate::NotFound);
    };
    let mut booking = row_to_booking_mysql(&row)?;

    if revives(booking.status, status) {
        if let Some(start) = first_live_clash_mysql(&mut tx, &booking).await? {
            return Ok(StatusUpdate::Conflict { start });
        }
    }

    let now = Utc::now();
    sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update booking status")?;

    if let Some(payment_status) = payment_status {
        sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE booking_id = ?")
            .bind(payment_status.to_string())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update payment status")?;
    }

    tx.commit().await.context("Failed to commit status change")?;
    booking.status = status;
    booking.updated_at = now;
    Ok(StatusUpdate::Updated(booking))
}

fn row_to_booking_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Booking> {
    Ok(Booking {
        id: row.get("id"),
        user_id: row.get("user_id"),
        field_id: row.get("field_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status: parse_status(row.get("status"))?,
        total_price: row.get("total_price"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
