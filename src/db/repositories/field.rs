//! Field repository
//!
//! Courts offered for rent. Prices are stored as REAL/DOUBLE.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Field, FieldInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const FIELD_COLUMNS: &str =
    "id, name, field_type, price_per_hour, image_url, description, created_at, updated_at";

#[async_trait]
pub trait FieldRepository: Send + Sync {
    /// All fields ordered by id
    async fn list(&self) -> Result<Vec<Field>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Field>>;

    async fn create(&self, input: &FieldInput) -> Result<Field>;

    /// Replace a field's attributes; `None` when it does not exist
    async fn update(&self, id: i64, input: &FieldInput) -> Result<Option<Field>>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;

    /// Whether any booking (in any status) references the field
    async fn has_bookings(&self, id: i64) -> Result<bool>;
}

pub struct SqlxFieldRepository {
    pool: DynDatabasePool,
}

impl SqlxFieldRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FieldRepository> {
        Arc::new(Self::new(pool))
    }

    async fn scalar_i64(&self, sql: &str, id: Option<i64>) -> Result<i64> {
        let value = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql);
                if let Some(id) = id {
                    query = query.bind(id);
                }
                query.fetch_one(sqlite(&self.pool)?).await?.get("count")
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql);
                if let Some(id) = id {
                    query = query.bind(id);
                }
                query.fetch_one(mysql(&self.pool)?).await?.get("count")
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl FieldRepository for SqlxFieldRepository {
    async fn list(&self) -> Result<Vec<Field>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_fields_sqlite(sqlite(&self.pool)?).await,
            DatabaseDriver::Mysql => list_fields_mysql(mysql(&self.pool)?).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Field>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_field_by_id_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_field_by_id_mysql(mysql(&self.pool)?, id).await,
        }
    }

    async fn create(&self, input: &FieldInput) -> Result<Field> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_field_sqlite(sqlite(&self.pool)?, input).await,
            DatabaseDriver::Mysql => create_field_mysql(mysql(&self.pool)?, input).await,
        }
    }

    async fn update(&self, id: i64, input: &FieldInput) -> Result<Option<Field>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_field_sqlite(sqlite(&self.pool)?, id, input).await,
            DatabaseDriver::Mysql => update_field_mysql(mysql(&self.pool)?, id, input).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM fields WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to delete field")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to delete field")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        self.scalar_i64("SELECT COUNT(*) AS count FROM fields", None)
            .await
            .context("Failed to count fields")
    }

    async fn has_bookings(&self, id: i64) -> Result<bool> {
        let count = self
            .scalar_i64(
                "SELECT COUNT(*) AS count FROM bookings WHERE field_id = ?",
                Some(id),
            )
            .await
            .context("Failed to count bookings for field")?;
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_fields_sqlite(pool: &SqlitePool) -> Result<Vec<Field>> {
    let rows = sqlx::query(&format!("SELECT {} FROM fields ORDER BY id", FIELD_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list fields")?;

    Ok(rows.iter().map(row_to_field_sqlite).collect())
}

async fn get_field_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Field>> {
    let row = sqlx::query(&format!("SELECT {} FROM fields WHERE id = ?", FIELD_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get field by ID")?;

    Ok(row.as_ref().map(row_to_field_sqlite))
}

async fn create_field_sqlite(pool: &SqlitePool, input: &FieldInput) -> Result<Field> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO fields (name, field_type, price_per_hour, image_url, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.name)
    .bind(&input.field_type)
    .bind(input.price_per_hour)
    .bind(&input.image_url)
    .bind(&input.description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create field")?;

    Ok(field_from_input(result.last_insert_rowid(), input, now))
}

async fn update_field_sqlite(pool: &SqlitePool, id: i64, input: &FieldInput) -> Result<Option<Field>> {
    let result = sqlx::query(
        r#"
        UPDATE fields
        SET name = ?, field_type = ?, price_per_hour = ?, image_url = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.name)
    .bind(&input.field_type)
    .bind(input.price_per_hour)
    .bind(&input.image_url)
    .bind(&input.description)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update field")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_field_by_id_sqlite(pool, id).await
}

fn row_to_field_sqlite(row: &sqlx::sqlite::SqliteRow) -> Field {
    Field {
        id: row.get("id"),
        name: row.get("name"),
        field_type: row.get("field_type"),
        price_per_hour: row.get("price_per_hour"),
        image_url: row.get("image_url"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_fields_mysql(pool: &MySqlPool) -> Result<Vec<Field>> {
    let rows = sqlx::query(&format!("SELECT {} FROM fields ORDER BY id", FIELD_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list fields")?;

    Ok(rows.iter().map(row_to_field_mysql).collect())
}

async fn get_field_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Field>> {
    let row = sqlx::query(&format!("SELECT {} FROM fields WHERE id = ?", FIELD_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get field by ID")?;

    Ok(row.as_ref().map(row_to_field_mysql))
}

async fn create_field_mysql(pool: &MySqlPool, input: &FieldInput) -> Result<Field> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO fields (name, field_type, price_per_hour, image_url, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.name)
    .bind(&input.field_type)
    .bind(input.price_per_hour)
    .bind(&input.image_url)
    .bind(&input.description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create field")?;

    Ok(field_from_input(result.last_insert_id() as i64, input, now))
}

async fn update_field_mysql(pool: &MySqlPool, id: i64, input: &FieldInput) -> Result<Option<Field>> {
    // MySQL reports zero affected rows for a no-op update, so check existence first.
    if get_field_by_id_mysql(pool, id).await?.is_none() {
        return Ok(None);
    }

    sqlx::query(
        r#"
        UPDATE fields
        SET name = ?, field_type = ?, price_per_hour = ?, image_url = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.name)
    .bind(&input.field_type)
    .bind(input.price_per_hour)
    .bind(&input.image_url)
    .bind(&input.description)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update field")?;

    get_field_by_id_mysql(pool, id).await
}

fn row_to_field_mysql(row: &sqlx::mysql::MySqlRow) -> Field {
    Field {
        id: row.get("id"),
        name: row.get("name"),
        field_type: row.get("field_type"),
        price_per_hour: row.get("price_per_hour"),
        image_url: row.get("image_url"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn field_from_input(id: i64, input: &FieldInput, now: chrono::DateTime<Utc>) -> Field {
    Field {
        id,
        name: input.name.clone(),
        field_type: input.field_type.clone(),
        price_per_hour: input.price_per_hour,
        image_url: input.image_url.clone(),
        description: input.description.clone(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxFieldRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxFieldRepository::new(pool.clone());
        (pool, repo)
    }

    fn court(name: &str, price: f64) -> FieldInput {
        FieldInput {
            name: name.to_string(),
            field_type: "Badminton".to_string(),
            price_per_hour: price,
            image_url: None,
            description: Some("Indoor, wooden floor".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_get_and_list() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create(&court("Court A", 35000.0)).await.unwrap();
        let b = repo.create(&court("Court B", 40000.0)).await.unwrap();

        let found = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Court A");
        assert_eq!(found.price_per_hour, 35000.0);

        let all = repo.list().await.unwrap();
        assert_eq!(all.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_field() {
        let (_pool, repo) = setup_test_repo().await;
        let field = repo.create(&court("Court A", 35000.0)).await.unwrap();

        let updated = repo
            .update(field.id, &court("Court A+", 45000.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Court A+");
        assert_eq!(updated.price_per_hour, 45000.0);

        assert!(repo.update(9999, &court("Ghost", 1.0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_field() {
        let (_pool, repo) = setup_test_repo().await;
        let field = repo.create(&court("Court A", 35000.0)).await.unwrap();

        assert!(!repo.has_bookings(field.id).await.unwrap());
        assert!(repo.delete(field.id).await.unwrap());
        assert!(!repo.delete(field.id).await.unwrap());
        assert!(repo.get_by_id(field.id).await.unwrap().is_none());
    }
}
