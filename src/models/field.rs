//! Field (court) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rentable court. Read-only input to booking admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: i64,
    pub name: String,
    /// Sport played on the court, e.g. "Badminton"
    pub field_type: String,
    pub price_per_hour: f64,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing a field
#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    pub name: String,
    #[serde(default = "default_field_type")]
    pub field_type: String,
    pub price_per_hour: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_field_type() -> String {
    "Badminton".to_string()
}
