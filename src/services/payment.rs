//! Payment proof service
//!
//! A booking owner uploads a transfer receipt; the file is stored under the
//! upload directory and the booking's payment row is created or replaced with
//! status `pending` until an admin marks the booking paid or canceled. A
//! replaced proof file is deleted once the new one is recorded.

use crate::config::UploadConfig;
use crate::db::repositories::{BookingRepository, PaymentRepository};
use crate::models::Payment;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("Booking not found: {0}")]
    NotFound(i64),

    /// The booking belongs to someone else
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct PaymentService {
    booking_repo: Arc<dyn BookingRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    upload_config: UploadConfig,
}

impl PaymentService {
    pub fn new(
        booking_repo: Arc<dyn BookingRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        upload_config: UploadConfig,
    ) -> Self {
        Self {
            booking_repo,
            payment_repo,
            upload_config,
        }
    }

    /// Attach a payment proof to one of the user's bookings.
    pub async fn upload_proof(
        &self,
        user_id: i64,
        booking_id: i64,
        upload: ProofUpload,
    ) -> Result<Payment, PaymentServiceError> {
        let booking = self
            .booking_repo
            .get_by_id(booking_id)
            .await
            .context("Failed to get booking")?
            .ok_or(PaymentServiceError::NotFound(booking_id))?;

        if booking.user_id != user_id {
            return Err(PaymentServiceError::Forbidden(
                "You can only pay for your own bookings".to_string(),
            ));
        }

        let config = &self.upload_config;
        if !config.is_type_allowed(&upload.content_type) {
            return Err(PaymentServiceError::ValidationError(format!(
                "Invalid file type: {}. Allowed types: {:?}",
                upload.content_type, config.allowed_types
            )));
        }
        if upload.data.is_empty() {
            return Err(PaymentServiceError::ValidationError(
                "Uploaded file is empty".to_string(),
            ));
        }
        if upload.data.len() as u64 > config.max_file_size {
            return Err(PaymentServiceError::ValidationError(format!(
                "File too large. Maximum size: {} bytes ({} MB)",
                config.max_file_size,
                config.max_file_size / 1024 / 1024
            )));
        }

        let previous = self
            .payment_repo
            .get_by_booking(booking_id)
            .await
            .context("Failed to load payment")?
            .and_then(|payment| payment.proof_url);

        fs::create_dir_all(&config.path)
            .await
            .context("Failed to create upload dir")?;

        let filename = format!(
            "{}.{}",
            Uuid::new_v4(),
            config.get_extension(&upload.content_type)
        );
        let stored = config.path.join(&filename);
        fs::write(&stored, &upload.data)
            .await
            .context("Failed to save file")?;

        let proof_url = format!("/uploads/{}", filename);
        let payment = match self
            .payment_repo
            .upsert_proof(booking_id, booking.total_price, &proof_url)
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                discard(&stored).await;
                return Err(e.context("Failed to save payment").into());
            }
        };

        if let Some(old) = previous.as_deref().and_then(|url| self.stored_path(url)) {
            discard(&old).await;
        }

        tracing::info!(
            "User {} uploaded payment proof for booking {}",
            user_id,
            booking_id
        );
        Ok(payment)
    }

    /// Local path of a proof URL issued by this service. Anything else,
    /// including names with path separators, maps to `None`.
    fn stored_path(&self, proof_url: &str) -> Option<PathBuf> {
        let name = proof_url.strip_prefix("/uploads/")?;
        let unsafe_name = name.contains(|c: char| c == '/' || c == '\\') || name.starts_with('.');
        if name.is_empty() || unsafe_name {
            return None;
        }
        Some(self.upload_config.path.join(name))
    }
}

async fn discard(path: &std::path::Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::warn!("Failed to remove proof file {}: {}", path.display(), e);
    }
}
