use std::collections::HashMap;

use uuid::Uuid;
use verdant_domain::{
	Pillar,
	scoring::{Contribution, PillarWeights, ScoreBreakdown, all_pillar_scores, normalize, overall_score},
};
use verdant_queue::TaskMessage;
use verdant_storage::{
	db::Db,
	models::{ExtractedIndicator, IndicatorDefinition, validation},
	queries::{self, NewScore},
};

use crate::Result;

/// Aggregates a document's valid extracted values into pillar scores and an
/// overall score, and stores the result with its full breakdown. Returns
/// whether a score was produced; with no valid numeric values there is
/// nothing to score.
pub async fn aggregate(
	db: &Db,
	definitions: &[IndicatorDefinition],
	scoring: &verdant_config::Scoring,
	msg: &TaskMessage,
) -> Result<bool> {
	let rows = queries::extracted_for_document(&db.pool, &msg.object_key).await?;
	let by_id: HashMap<Uuid, &ExtractedIndicator> =
		rows.iter().map(|row| (row.indicator_id, row)).collect();
	let mut contributions = Vec::new();
	let mut missing = Vec::new();

	for def in definitions {
		let Some(pillar) = Pillar::from_code(&def.pillar) else {
			tracing::warn!(code = %def.code, pillar = %def.pillar, "Unknown pillar in catalog.");
			missing.push(def.code.clone());

			continue;
		};
		let value = by_id.get(&def.indicator_id).and_then(|row| {
			if row.validation_status != validation::VALID {
				return None;
			}

			row.value_numeric.map(|value| (value, row.citations.clone()))
		});

		match value {
			Some((value_numeric, citations)) => contributions.push(Contribution {
				code: def.code.clone(),
				pillar,
				weight: def.weight,
				value_numeric,
				normalized: normalize(value_numeric, def.scale_max),
				citations,
			}),
			None => missing.push(def.code.clone()),
		}
	}

	let weights = PillarWeights {
		environmental: scoring.environmental_weight,
		social: scoring.social_weight,
		governance: scoring.governance_weight,
	};
	let pillar_scores = all_pillar_scores(&contributions);
	let Some(overall) = overall_score(&pillar_scores, &weights) else {
		tracing::warn!(
			object_key = %msg.object_key,
			"No valid numeric indicator values; score not produced."
		);

		return Ok(false);
	};
	let breakdown = ScoreBreakdown {
		pillar_weights: weights,
		pillar_scores: pillar_scores.clone(),
		contributions,
		missing,
	};
	let breakdown_json = serde_json::to_value(&breakdown)?;

	queries::upsert_score(&db.pool, &NewScore {
		company_id: msg.company_id,
		report_year: msg.report_year,
		object_key: &msg.object_key,
		environmental: pillar_scores.environmental,
		social: pillar_scores.social,
		governance: pillar_scores.governance,
		overall,
		breakdown: &breakdown_json,
	})
	.await?;

	tracing::info!(
		company_id = msg.company_id,
		report_year = msg.report_year,
		overall,
		"Score stored."
	);

	Ok(true)
}
