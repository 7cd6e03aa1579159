use verdant_chunking::{Chunk, ChunkingConfig};
use verdant_queue::{Delivery, EXTRACTION_QUEUE, Outcome, TaskMessage};
use verdant_storage::{models::status, qdrant::ChunkPoint, queries};

use crate::PipelineState;

/// Embedding stage: fetch the report, split it into chunks, embed them, and
/// write both stores. Upstream and storage failures are retryable; a document
/// that can never yield text is rejected outright.
pub async fn handle(state: &PipelineState, delivery: Delivery) -> Outcome {
	let msg = &delivery.message;
	let bytes =
		match verdant_providers::documents::fetch(&state.cfg.providers.documents, &msg.object_key)
			.await
		{
			Ok(bytes) => bytes,
			Err(err) => return Outcome::Transient(format!("document fetch failed: {err}")),
		};
	let pages = match crate::pdf::extract_pages(&bytes) {
		Ok(pages) => pages,
		Err(err) => return Outcome::Permanent(format!("unreadable pdf: {err}")),
	};
	let chunk_cfg = ChunkingConfig {
		max_words: state.cfg.chunking.max_words,
		overlap_words: state.cfg.chunking.overlap_words,
	};
	let chunks = verdant_chunking::split_pages(&pages, &chunk_cfg);

	if chunks.is_empty() {
		return Outcome::Permanent("no extractable text".to_string());
	}

	let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
	let vectors =
		match verdant_providers::embedding::embed(&state.cfg.providers.embedding, &texts).await {
			Ok(vectors) => vectors,
			Err(err) => return Outcome::Transient(format!("embedding request failed: {err}")),
		};

	if vectors.len() != chunks.len() {
		return Outcome::Transient(format!(
			"embedding count mismatch: got {} vectors for {} chunks",
			vectors.len(),
			chunks.len()
		));
	}

	if let Err(err) = persist(state, msg, &chunks, &vectors).await {
		return Outcome::Transient(format!("persisting embeddings failed: {err}"));
	}

	// The delayed extraction task from intake may still be far out; hand the
	// now-ready document straight to the extraction stage.
	if let Err(err) = state.queue.publish(EXTRACTION_QUEUE, msg).await {
		return Outcome::Transient(format!("publishing extraction task failed: {err}"));
	}

	tracing::info!(
		object_key = %msg.object_key,
		pages = pages.len(),
		chunks = chunks.len(),
		"Document embedded."
	);

	Outcome::Success
}

/// Postgres rows are the source of truth; the Qdrant mirror is refreshed
/// before the transaction commits so a mirror failure leaves the previous
/// generation intact and the task retryable.
async fn persist(
	state: &PipelineState,
	msg: &TaskMessage,
	chunks: &[Chunk],
	vectors: &[Vec<f32>],
) -> crate::Result<()> {
	let dim = state.cfg.storage.qdrant.vector_dim as i32;
	let mut tx = state.db.pool.begin().await?;

	queries::delete_chunks(&mut *tx, &msg.object_key).await?;

	for (chunk, vec) in chunks.iter().zip(vectors) {
		queries::insert_chunk(
			&mut *tx,
			&msg.object_key,
			chunk.chunk_index,
			chunk.page_no,
			&chunk.text,
			dim,
			vec,
		)
		.await?;
	}

	queries::set_document_status(&mut *tx, &msg.object_key, status::EMBEDDED).await?;
	state.qdrant.delete_document_points(&msg.object_key).await?;

	let points: Vec<ChunkPoint> = chunks
		.iter()
		.map(|c| ChunkPoint { chunk_index: c.chunk_index, page_no: c.page_no, text: c.text.clone() })
		.collect();

	state
		.qdrant
		.upsert_chunk_points(&msg.object_key, msg.company_id, msg.report_year, &points, vectors)
		.await?;
	tx.commit().await?;

	Ok(())
}
