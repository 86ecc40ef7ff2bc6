//! Field service
//!
//! Court catalogue management. Prices set here feed booking admission.

use crate::db::repositories::FieldRepository;
use crate::models::{Field, FieldInput};
use anyhow::Context;
use std::sync::Arc;

/// Name of the court created on an empty database
pub const DEFAULT_FIELD_NAME: &str = "Lapangan Badminton";

#[derive(Debug, thiserror::Error)]
pub enum FieldServiceError {
    #[error("Field not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The field still has bookings
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct FieldService {
    repo: Arc<dyn FieldRepository>,
}

impl FieldService {
    pub fn new(repo: Arc<dyn FieldRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<Field>, FieldServiceError> {
        let fields = self.repo.list().await.context("Failed to list fields")?;
        Ok(fields)
    }

    pub async fn get(&self, id: i64) -> Result<Field, FieldServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get field")?
            .ok_or(FieldServiceError::NotFound(id))
    }

    pub async fn create(&self, input: FieldInput) -> Result<Field, FieldServiceError> {
        let input = validate(input)?;
        let field = self
            .repo
            .create(&input)
            .await
            .context("Failed to create field")?;
        tracing::info!("Created field {} ({})", field.id, field.name);
        Ok(field)
    }

    pub async fn update(&self, id: i64, input: FieldInput) -> Result<Field, FieldServiceError> {
        let input = validate(input)?;
        self.repo
            .update(id, &input)
            .await
            .context("Failed to update field")?
            .ok_or(FieldServiceError::NotFound(id))
    }

    /// Fields with booking history cannot be removed.
    pub async fn delete(&self, id: i64) -> Result<(), FieldServiceError> {
        if self
            .repo
            .has_bookings(id)
            .await
            .context("Failed to check field bookings")?
        {
            return Err(FieldServiceError::Conflict(format!(
                "Field {} has bookings and cannot be deleted",
                id
            )));
        }

        let deleted = self.repo.delete(id).await.context("Failed to delete field")?;
        if !deleted {
            return Err(FieldServiceError::NotFound(id));
        }
        tracing::info!("Deleted field {}", id);
        Ok(())
    }

    /// Seed one court when the catalogue is empty. Returns the created field.
    pub async fn ensure_default_field(
        &self,
        price_per_hour: f64,
    ) -> Result<Option<Field>, FieldServiceError> {
        let count = self.repo.count().await.context("Failed to count fields")?;
        if count > 0 {
            return Ok(None);
        }

        let field = self
            .create(FieldInput {
                name: DEFAULT_FIELD_NAME.to_string(),
                field_type: "Badminton".to_string(),
                price_per_hour,
                image_url: None,
                description: None,
            })
            .await?;
        Ok(Some(field))
    }
}

fn validate(mut input: FieldInput) -> Result<FieldInput, FieldServiceError> {
    input.name = input.name.trim().to_string();
    if input.name.is_empty() {
        return Err(FieldServiceError::ValidationError(
            "Field name cannot be empty".to_string(),
        ));
    }
    if !input.price_per_hour.is_finite() || input.price_per_hour <= 0.0 {
        return Err(FieldServiceError::ValidationError(
            "Price per hour must be positive".to_string(),
        ));
    }
    input.field_type = input.field_type.trim().to_string();
    if input.field_type.is_empty() {
        input.field_type = "Badminton".to_string();
    }
    Ok(input)
}
