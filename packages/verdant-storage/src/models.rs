use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Document processing statuses, advanced by each pipeline stage in order.
pub mod status {
	pub const INGESTED: &str = "ingested";
	pub const EMBEDDED: &str = "embedded";
	pub const EXTRACTED: &str = "extracted";
	pub const SCORED: &str = "scored";
}

/// Validation statuses for extracted indicator values.
pub mod validation {
	pub const VALID: &str = "valid";
	pub const INVALID: &str = "invalid";
	pub const PENDING: &str = "pending";
}

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRecord {
	pub object_key: String,
	pub company_id: i64,
	pub report_year: i32,
	pub status: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct IndicatorDefinition {
	pub indicator_id: Uuid,
	pub code: String,
	pub pillar: String,
	pub attribute: String,
	pub description: String,
	pub unit: String,
	pub scale_max: f64,
	pub weight: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ExtractedIndicator {
	pub object_key: String,
	pub indicator_id: Uuid,
	pub value_raw: String,
	pub value_numeric: Option<f64>,
	pub confidence: f32,
	pub validation_status: String,
	pub citations: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoreRecord {
	pub company_id: i64,
	pub report_year: i32,
	pub object_key: String,
	pub environmental: Option<f64>,
	pub social: Option<f64>,
	pub governance: Option<f64>,
	pub overall: f64,
	pub breakdown: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
