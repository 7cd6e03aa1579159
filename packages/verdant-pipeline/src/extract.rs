use serde_json::Value;
use verdant_queue::{Delivery, Outcome, TaskMessage};
use verdant_storage::{
	models::{IndicatorDefinition, status, validation},
	qdrant::RetrievedChunk,
	queries::{self, NewExtractedIndicator},
};

use crate::{Error, PipelineState, Result, score};

/// Extraction stage: for each catalog indicator, retrieve the most relevant
/// chunks for this document and ask the inference provider for a structured
/// value. Indicators already extracted for the document are skipped, so a
/// redelivered task only finishes the remainder.
pub async fn handle(state: &PipelineState, delivery: Delivery) -> Outcome {
	let msg = &delivery.message;
	let chunk_count = match queries::count_chunks(&state.db.pool, &msg.object_key).await {
		Ok(count) => count,
		Err(err) => return Outcome::Transient(format!("chunk lookup failed: {err}")),
	};

	// Readiness gate: extraction tasks are published at intake and may arrive
	// before the embedding stage has run.
	if chunk_count == 0 {
		return Outcome::NotReady(format!("no embedded chunks for {}", msg.object_key));
	}
	if state.definitions.is_empty() {
		return Outcome::Permanent("no indicator definitions configured".to_string());
	}

	let existing = match queries::extracted_indicator_ids(&state.db.pool, &msg.object_key).await {
		Ok(ids) => ids,
		Err(err) => return Outcome::Transient(format!("extraction lookup failed: {err}")),
	};
	let mut attempted = 0_usize;
	let mut failures = Vec::new();

	for def in &state.definitions {
		if existing.contains(&def.indicator_id) {
			continue;
		}

		attempted += 1;

		if let Err(err) = extract_indicator(state, msg, def).await {
			tracing::warn!(
				object_key = %msg.object_key,
				code = %def.code,
				error = %err,
				"Indicator extraction failed."
			);
			failures.push(def.code.clone());
		}
	}

	if !failures.is_empty() {
		return Outcome::Transient(format!(
			"{} of {attempted} indicators failed: {}",
			failures.len(),
			failures.join(", ")
		));
	}

	match finalize(state, msg).await {
		Ok(true) => Outcome::Success,
		Ok(false) => Outcome::Permanent("no valid indicator values to score".to_string()),
		Err(err) => Outcome::Transient(format!("score aggregation failed: {err}")),
	}
}

async fn extract_indicator(
	state: &PipelineState,
	msg: &TaskMessage,
	def: &IndicatorDefinition,
) -> Result<()> {
	let query_text = build_query(def);
	let vectors =
		verdant_providers::embedding::embed(&state.cfg.providers.embedding, &[query_text]).await?;
	let vector = vectors.into_iter().next().ok_or_else(|| {
		Error::Message("Embedding provider returned no vector for the query.".to_string())
	})?;
	let candidates = state
		.qdrant
		.retrieve(msg.company_id, msg.report_year, vector, state.cfg.retrieval.top_k)
		.await?;
	let result = if candidates.is_empty() {
		// Chunks exist but none matched the partition filter. Record the miss
		// instead of asking the model to invent a value.
		InferenceResult {
			value_raw: Value::Null.to_string(),
			value_numeric: None,
			value_text: None,
			confidence: None,
			citations: Value::Array(Vec::new()),
		}
	} else {
		let messages = build_messages(def, &candidates);
		let response =
			verdant_providers::inference::complete(&state.cfg.providers.inference, &messages)
				.await?;

		parse_inference_result(&response)
	};
	let validation_status = validate_result(&result);

	queries::upsert_extracted_indicator(&state.db.pool, &NewExtractedIndicator {
		object_key: &msg.object_key,
		indicator_id: def.indicator_id,
		value_raw: &result.value_raw,
		value_numeric: result.value_numeric,
		// Clamped to the stored range; an out-of-range confidence already
		// marks the row invalid.
		confidence: result.confidence.unwrap_or(0.0).clamp(0.0, 1.0) as f32,
		validation_status,
		citations: &result.citations,
	})
	.await?;

	Ok(())
}

async fn finalize(state: &PipelineState, msg: &TaskMessage) -> Result<bool> {
	queries::mark_document_extracted(&state.db.pool, &msg.object_key).await?;

	let scored = score::aggregate(&state.db, &state.definitions, &state.cfg.scoring, msg).await?;

	if scored {
		queries::set_document_status(&state.db.pool, &msg.object_key, status::SCORED).await?;
	}

	Ok(scored)
}

/// The structured answer expected from the inference provider. All fields are
/// optional at parse time; validation decides whether the row is usable.
pub struct InferenceResult {
	pub value_raw: String,
	pub value_numeric: Option<f64>,
	pub value_text: Option<String>,
	pub confidence: Option<f64>,
	pub citations: Value,
}

pub fn parse_inference_result(response: &Value) -> InferenceResult {
	InferenceResult {
		value_raw: response.to_string(),
		value_numeric: response.get("value_numeric").and_then(|v| v.as_f64()),
		value_text: response
			.get("value_text")
			.and_then(|v| v.as_str())
			.map(str::to_string),
		confidence: response.get("confidence").and_then(|v| v.as_f64()),
		citations: response.get("citations").cloned().unwrap_or(Value::Array(Vec::new())),
	}
}

/// Range checks on the parsed result. Invalid rows are stored for audit but
/// excluded from scoring.
pub fn validate_result(result: &InferenceResult) -> &'static str {
	let Some(confidence) = result.confidence else {
		return validation::INVALID;
	};

	if !(0.0..=1.0).contains(&confidence) {
		return validation::INVALID;
	}

	let has_numeric = result.value_numeric.is_some_and(f64::is_finite);
	let has_text = result.value_text.as_deref().is_some_and(|t| !t.trim().is_empty());

	if !has_numeric && !has_text {
		return validation::INVALID;
	}

	let Some(citations) = result.citations.as_array() else {
		return validation::INVALID;
	};
	let pages_ok = citations
		.iter()
		.all(|c| c.get("page_no").and_then(|p| p.as_i64()).is_some_and(|p| p >= 1));

	if !pages_ok {
		return validation::INVALID;
	}

	validation::VALID
}

/// Retrieval query text for an indicator, built from its catalog entry.
pub fn build_query(def: &IndicatorDefinition) -> String {
	format!("{}: {} (unit: {})", def.attribute, def.description, def.unit)
}

fn build_messages(def: &IndicatorDefinition, candidates: &[RetrievedChunk]) -> Vec<Value> {
	let mut context = String::new();

	for chunk in candidates {
		context.push_str(&format!("[page {}] {}\n\n", chunk.page_no, chunk.text));
	}

	let system = "You extract ESG indicator values from sustainability report excerpts. \
		Respond with a single JSON object of the shape \
		{\"value_numeric\": number or null, \"value_text\": string or null, \
		\"confidence\": number between 0 and 1, \
		\"citations\": [{\"page_no\": number, \"quote\": string}]}. \
		Use null when the excerpts do not state the value, and only cite pages \
		that appear in the excerpts.";
	let user = format!(
		"Indicator {} (pillar {}): {}. {} Unit: {}.\n\nReport excerpts:\n\n{context}",
		def.code, def.pillar, def.attribute, def.description, def.unit
	);

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}
