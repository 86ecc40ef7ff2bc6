//! Payment repository
//!
//! One payment row per booking, created or replaced when a proof is uploaded.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Payment, PaymentStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get_by_booking(&self, booking_id: i64) -> Result<Option<Payment>>;

    /// Create the booking's payment or replace its proof, resetting the
    /// status to `pending`
    async fn upsert_proof(&self, booking_id: i64, amount: f64, proof_url: &str) -> Result<Payment>;
}

pub struct SqlxPaymentRepository {
    pool: DynDatabasePool,
}

impl SqlxPaymentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PaymentRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_PAYMENT: &str = "SELECT id, booking_id, amount, proof_url, status, created_at, updated_at \
     FROM payments WHERE booking_id = ?";

const UPSERT_SQLITE: &str = r#"
    INSERT INTO payments (booking_id, amount, proof_url, status, created_at, updated_at)
    VALUES (?, ?, ?, 'pending', ?, ?)
    ON CONFLICT(booking_id) DO UPDATE SET
        proof_url = excluded.proof_url,
        status = 'pending',
        updated_at = excluded.updated_at
"#;

const UPSERT_MYSQL: &str = r#"
    INSERT INTO payments (booking_id, amount, proof_url, status, created_at, updated_at)
    VALUES (?, ?, ?, 'pending', ?, ?)
    ON DUPLICATE KEY UPDATE
        proof_url = VALUES(proof_url),
        status = 'pending',
        updated_at = VALUES(updated_at)
"#;

#[async_trait]
impl PaymentRepository for SqlxPaymentRepository {
    async fn get_by_booking(&self, booking_id: i64) -> Result<Option<Payment>> {
        let payment = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SELECT_PAYMENT)
                    .bind(booking_id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get payment")?;
                match row {
                    Some(row) => Some(Payment {
                        id: row.get("id"),
                        booking_id: row.get("booking_id"),
                        amount: row.get("amount"),
                        proof_url: row.get("proof_url"),
                        status: PaymentStatus::from_str(row.get("status"))?,
                        created_at: row.get("created_at"),
                        updated_at: row.get("updated_at"),
                    }),
                    None => None,
                }
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(SELECT_PAYMENT)
                    .bind(booking_id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get payment")?;
                match row {
                    Some(row) => Some(Payment {
                        id: row.get("id"),
                        booking_id: row.get("booking_id"),
                        amount: row.get("amount"),
                        proof_url: row.get("proof_url"),
                        status: PaymentStatus::from_str(row.get("status"))?,
                        created_at: row.get("created_at"),
                        updated_at: row.get("updated_at"),
                    }),
                    None => None,
                }
            }
        };
        Ok(payment)
    }

    async fn upsert_proof(&self, booking_id: i64, amount: f64, proof_url: &str) -> Result<Payment> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(UPSERT_SQLITE)
                    .bind(booking_id)
                    .bind(amount)
                    .bind(proof_url)
                    .bind(now)
                    .bind(now)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to save payment proof")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(UPSERT_MYSQL)
                    .bind(booking_id)
                    .bind(amount)
                    .bind(proof_url)
                    .bind(now)
                    .bind(now)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to save payment proof")?;
            }
        }

        self.get_by_booking(booking_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Payment not found after upsert"))
    }
}
