//! Login session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque token handed to the client
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
