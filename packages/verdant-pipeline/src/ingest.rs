use time::Duration;
use verdant_queue::{EMBEDDING_QUEUE, EXTRACTION_QUEUE, Queue, TaskMessage};
use verdant_storage::{db::Db, queries};

use crate::Result;

/// Registers a report for processing: the document row and both stage tasks
/// commit in one transaction, so a registered document always has its tasks.
/// The extraction task starts delayed by the gate interval; the embedding
/// stage republishes an immediate one on success, and the readiness gate
/// covers whichever arrives first.
pub async fn ingest_document(
	db: &Db,
	gate: &verdant_config::Gate,
	object_key: &str,
	company_id: i64,
	report_year: i32,
) -> Result<()> {
	let message =
		TaskMessage { object_key: object_key.to_string(), company_id, report_year };
	let mut tx = db.pool.begin().await?;

	queries::upsert_document(&mut *tx, object_key, company_id, report_year).await?;
	Queue::publish_tx(&mut tx, EMBEDDING_QUEUE, &message, None).await?;
	Queue::publish_tx(
		&mut tx,
		EXTRACTION_QUEUE,
		&message,
		Some(Duration::seconds(gate.delay_seconds)),
	)
	.await?;

	tx.commit().await?;

	tracing::info!(object_key, company_id, report_year, "Document registered for processing.");

	Ok(())
}
