use serde_json::Value;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
	Result,
	models::{DocumentRecord, ExtractedIndicator, IndicatorDefinition, ScoreRecord, status},
};

pub struct NewExtractedIndicator<'a> {
	pub object_key: &'a str,
	pub indicator_id: Uuid,
	pub value_raw: &'a str,
	pub value_numeric: Option<f64>,
	pub confidence: f32,
	pub validation_status: &'a str,
	pub citations: &'a Value,
}

pub struct NewScore<'a> {
	pub company_id: i64,
	pub report_year: i32,
	pub object_key: &'a str,
	pub environmental: Option<f64>,
	pub social: Option<f64>,
	pub governance: Option<f64>,
	pub overall: f64,
	pub breakdown: &'a Value,
}

/// Registers a document without regressing the status a later stage may have
/// already set.
pub async fn upsert_document<'e, E>(
	executor: E,
	object_key: &str,
	company_id: i64,
	report_year: i32,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO documents (object_key, company_id, report_year, status)
VALUES ($1, $2, $3, $4)
ON CONFLICT (object_key) DO UPDATE
SET
	company_id = EXCLUDED.company_id,
	report_year = EXCLUDED.report_year,
	updated_at = now()",
	)
	.bind(object_key)
	.bind(company_id)
	.bind(report_year)
	.bind(status::INGESTED)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn set_document_status<'e, E>(executor: E, object_key: &str, status: &str) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("UPDATE documents SET status = $1, updated_at = now() WHERE object_key = $2")
		.bind(status)
		.bind(object_key)
		.execute(executor)
		.await?;

	Ok(())
}

/// Marks a document `extracted` unless scoring already finished; a
/// redelivered extraction task must not regress a scored document.
pub async fn mark_document_extracted<'e, E>(executor: E, object_key: &str) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE documents
SET status = $1, updated_at = now()
WHERE object_key = $2 AND status <> $3",
	)
	.bind(status::EXTRACTED)
	.bind(object_key)
	.bind(status::SCORED)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_document<'e, E>(executor: E, object_key: &str) -> Result<Option<DocumentRecord>>
where
	E: PgExecutor<'e>,
{
	let document =
		sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE object_key = $1")
			.bind(object_key)
			.fetch_optional(executor)
			.await?;

	Ok(document)
}

pub async fn delete_chunks<'e, E>(executor: E, object_key: &str) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("DELETE FROM embedding_chunks WHERE object_key = $1")
		.bind(object_key)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn insert_chunk<'e, E>(
	executor: E,
	object_key: &str,
	chunk_index: i32,
	page_no: i32,
	text: &str,
	embedding_dim: i32,
	vec: &[f32],
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO embedding_chunks (object_key, chunk_index, page_no, text, embedding_dim, vec)
VALUES ($1, $2, $3, $4, $5, $6::text::vector)",
	)
	.bind(object_key)
	.bind(chunk_index)
	.bind(page_no)
	.bind(text)
	.bind(embedding_dim)
	.bind(format_vector_text(vec))
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn count_chunks<'e, E>(executor: E, object_key: &str) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count: i64 =
		sqlx::query_scalar("SELECT count(*) FROM embedding_chunks WHERE object_key = $1")
			.bind(object_key)
			.fetch_one(executor)
			.await?;

	Ok(count)
}

pub async fn load_indicator_definitions<'e, E>(executor: E) -> Result<Vec<IndicatorDefinition>>
where
	E: PgExecutor<'e>,
{
	let definitions = sqlx::query_as::<_, IndicatorDefinition>(
		"SELECT * FROM indicator_definitions ORDER BY code",
	)
	.fetch_all(executor)
	.await?;

	Ok(definitions)
}

pub async fn extracted_indicator_ids<'e, E>(executor: E, object_key: &str) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids: Vec<Uuid> =
		sqlx::query_scalar("SELECT indicator_id FROM extracted_indicators WHERE object_key = $1")
			.bind(object_key)
			.fetch_all(executor)
			.await?;

	Ok(ids)
}

/// Most-recent-wins upsert on `(object_key, indicator_id)`. Safe under
/// redelivered tasks.
pub async fn upsert_extracted_indicator<'e, E>(
	executor: E,
	row: &NewExtractedIndicator<'_>,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO extracted_indicators (
	object_key,
	indicator_id,
	value_raw,
	value_numeric,
	confidence,
	validation_status,
	citations
)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (object_key, indicator_id) DO UPDATE
SET
	value_raw = EXCLUDED.value_raw,
	value_numeric = EXCLUDED.value_numeric,
	confidence = EXCLUDED.confidence,
	validation_status = EXCLUDED.validation_status,
	citations = EXCLUDED.citations,
	updated_at = now()",
	)
	.bind(row.object_key)
	.bind(row.indicator_id)
	.bind(row.value_raw)
	.bind(row.value_numeric)
	.bind(row.confidence)
	.bind(row.validation_status)
	.bind(row.citations)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn extracted_for_document<'e, E>(
	executor: E,
	object_key: &str,
) -> Result<Vec<ExtractedIndicator>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, ExtractedIndicator>(
		"SELECT * FROM extracted_indicators WHERE object_key = $1",
	)
	.bind(object_key)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn upsert_score<'e, E>(executor: E, score: &NewScore<'_>) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO scores (
	company_id,
	report_year,
	object_key,
	environmental,
	social,
	governance,
	overall,
	breakdown
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (company_id, report_year) DO UPDATE
SET
	object_key = EXCLUDED.object_key,
	environmental = EXCLUDED.environmental,
	social = EXCLUDED.social,
	governance = EXCLUDED.governance,
	overall = EXCLUDED.overall,
	breakdown = EXCLUDED.breakdown,
	updated_at = now()",
	)
	.bind(score.company_id)
	.bind(score.report_year)
	.bind(score.object_key)
	.bind(score.environmental)
	.bind(score.social)
	.bind(score.governance)
	.bind(score.overall)
	.bind(score.breakdown)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_score<'e, E>(
	executor: E,
	company_id: i64,
	report_year: i32,
) -> Result<Option<ScoreRecord>>
where
	E: PgExecutor<'e>,
{
	let score = sqlx::query_as::<_, ScoreRecord>(
		"SELECT * FROM scores WHERE company_id = $1 AND report_year = $2",
	)
	.bind(company_id)
	.bind(report_year)
	.fetch_optional(executor)
	.await?;

	Ok(score)
}

pub fn format_vector_text(vec: &[f32]) -> String {
	let mut out = String::from("[");

	for (idx, value) in vec.iter().enumerate() {
		if idx > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_text_matches_pgvector_literal() {
		assert_eq!(format_vector_text(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
		assert_eq!(format_vector_text(&[]), "[]");
	}
}
